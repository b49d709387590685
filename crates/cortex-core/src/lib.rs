//! # cortex-core
//!
//! Foundation layer of the Cortex plugin host: the message bus, typed
//! channels, the capability data model, the contracts of the shell's
//! external collaborators, and the template model.
//!
//! Higher layers build on this crate: `cortex-jobs` adds the scheduler,
//! `cortex-host` the shell and plugin manager, `cortex-interface` the
//! user-facing interface bases.

pub mod bus;
pub mod capability;
pub mod channel;
pub mod error;
pub mod message;
pub mod services;
pub mod template;

pub use bus::{MessageBus, MessageHandler, Subscription};
pub use capability::{
    ApiRoute, Capabilities, Command, CommandContext, CommandHandler, CommandInfo, CommandResponse,
    HttpMethod, ProgressNotification, ProgressSender, Resource, ResourceContent, ResourceContents,
    ResourceHandler, ResourceInfo, Tool, ToolContext, ToolHandler, ToolInfo, ToolResponse,
    ToolVisibility,
};
pub use channel::{
    Channel, CommandRegisterPayload, LifecycleEvent, PluginLifecyclePayload, PluginsReadyPayload,
    ResourceGetPayload, ResourceRegisterPayload, ToolExecutePayload, ToolProgressPayload,
    ToolRegisterPayload, system,
};
pub use error::{BusError, ServiceError, TemplateError};
pub use message::{BusMessage, MessageResponse};
pub use services::{
    AgentResponse, AgentService, AiReply, AiService, AppInfo, ContentCapabilities, ContentService,
    Conversation, ConversationStore, Daemon, DaemonHealth, DataSource, EntityService,
    EntityTypeDefinition, HealthStatus, IdentityInfo, MessageContext, MessageRole, McpService,
    PermissionLevel, PermissionService, QueryOptions, StoredMessage,
};
pub use template::{JsonFormatter, Template, TemplateFormatter};
