pub mod alerts;
pub mod assistant;
pub mod attachment;
pub mod context;
pub mod cooldown;
pub mod domain;
pub mod error;
pub mod fenced;
pub mod interpreter;
pub mod markdown;
pub mod ports;

pub use alerts::{AlertFeed, FetchError, FetchTicket, SlotView};
pub use assistant::{Assistant, ChatError, LearningPath, PendingTurn, LEARNING_PATHS};
pub use attachment::AttachmentError;
pub use context::{AiContext, ClientHandle, ClientStatus, SlotReport};
pub use cooldown::Cooldown;
pub use domain::{
    AlertRecord, Attachment, Author, Citation, ConversationMessage, Credential, CredentialSlot,
    Notification, NotificationKind, SourceFile,
};
pub use error::{classify, IngestError};
pub use ports::{
    ClientFactory, ContentPart, CredentialStore, GenerateRequest, GenerateResponse,
    GenerativeModelService, GroundingChunk, NotificationSink, PortError, PortResult,
};
