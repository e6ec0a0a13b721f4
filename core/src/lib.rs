pub mod config;
pub mod definition;
pub mod executor;
pub mod init;
pub mod resolver;

// Re-export main types
pub use definition::{DefinitionError, WorkflowDefinition};
pub use executor::{
    ExecutionContext, ExecutionError, Executor, ResolvedTask, RunInput, RunOutput, Step,
    StepError, TaskHandler, TaskOutput,
};
pub use resolver::{FilterRegistry, ResolveError, Resolver};

// Re-export init API for convenience
pub use init::{initialize, InitBuilder, InitOptions};
