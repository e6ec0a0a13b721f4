//! Workflow tree types

pub mod step;

pub use step::{
    BranchStep, ForeachStep, JoinPolicy, MapReduceStep, ParallelStep, Step, SwitchStep, TaskStep,
    TryStep, WhileStep,
};
