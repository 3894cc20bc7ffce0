pub mod completion;
pub mod message;
pub mod session;
pub mod thread;
pub mod timestamp;

pub use completion::{CompletionRequest, ModelDescriptor};
pub use message::{ASSISTANT_DISPLAY_NAME, Message, MessageRole};
pub use session::{InvalidSessionId, SessionIdentity};
pub use thread::{
    NEW_THREAD_TITLE, SessionData, SessionResponse, ThreadRecord, ThreadSummary,
};
pub use timestamp::Timestamp;
