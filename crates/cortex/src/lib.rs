//! # Cortex
//!
//! A plugin-based personal knowledge-management runtime.
//!
//! ## Overview
//!
//! Cortex hosts independently authored plugins and wires them into a live
//! process: plugins publish and consume typed messages on a central bus,
//! expose tools, resources, and commands to external protocols, enqueue
//! background jobs and batches, run long-lived daemons, and stream progress
//! events back to user-facing interfaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌─────────┐    ┌──────────────┐
//! │   Runtime    │───▶│  Shell  │───▶│ PluginManager│──▶ plugins
//! │ (config/log) │    │         │    └──────────────┘
//! └──────────────┘    │  ├ bus ──────▶ typed channels
//!                     │  ├ jobs ─────▶ handlers + progress events
//!                     │  └ daemons ──▶ start/stop/health
//!                     └─────────┘
//! ```
//!
//! - **Shell**: process-wide host owning the bus, scheduler, and registries
//! - **Plugins**: core / service / interface units initialized in
//!   dependency order by a fixed-point loop
//! - **Contexts**: three strictly widening capability tiers with automatic
//!   namespacing of everything a plugin emits
//! - **Interfaces**: progress routing with 500 ms edit coalescing and
//!   reply-before-completion ordering
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use cortex::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = cortex_runtime::load_config()?;
//!     let runtime = CortexRuntime::builder(config)
//!         .ai(my_model_client)
//!         .entities(my_entity_store)
//!         .content(my_formatter)
//!         .conversations(my_conversation_db)
//!         .permissions(my_permissions)
//!         .mcp(my_mcp_facade)
//!         .agent(my_agent_loop)
//!         .plugin(Arc::new(NotesPlugin::default()))
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub use cortex_core;
pub use cortex_host;
pub use cortex_interface;
pub use cortex_jobs;
pub use cortex_runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use cortex::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use cortex_runtime::{CortexConfig, CortexRuntime, load_config};

    // Shell and plugin contract
    pub use cortex_host::{
        CoreContext, InterfaceContext, Plugin, PluginStatus, PluginType, ServiceContext, Shell,
    };

    // Capability model
    pub use cortex_core::{
        ApiRoute, Capabilities, Command, CommandResponse, Resource, Tool, ToolContext,
        ToolResponse, ToolVisibility,
    };

    // Jobs
    pub use cortex_jobs::{BatchOperation, JobContext, JobHandler, JobStatus, ProgressReporter};

    // Interfaces
    pub use cortex_interface::{IncomingMessage, InterfaceAdapter, MessageInterface};
}
