//! Sotto core: data model and external collaborator seams.
//!
//! The relay core treats persistence and the answering service as
//! collaborators behind traits, so the hub logic never knows whether it is
//! talking to the bundled in-memory stores, a database, or a remote model.
//!
//! ```text
//! sotto-server
//!   ├─ IdentityStore   (public key -> Identity; sole authentication)
//!   ├─ MessageStore    (append-only ciphertext history)
//!   └─ AnswerService   (question text -> answer text)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod assistant;
mod model;
mod store;

pub use assistant::{
    ANSWER_PREFIX, AnswerService, AssistantError, DEFAULT_TRIGGER_TOKEN, NoAnswerService,
    is_assistant_question,
};
pub use model::{Identity, RelayMessage, StoredMessage};
pub use store::{IdentityStore, MemoryIdentityStore, MemoryMessageStore, MessageStore, StoreError};
