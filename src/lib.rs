#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_wraps,
    dead_code
)]

use clap::Subcommand;
use serde::{Deserialize, Serialize};

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod observability;
pub mod sessions;

pub use config::Config;

/// Checkpoint inspection subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckpointCommands {
    /// List every thread that has checkpoints
    List,
    /// Show the most recent turns of a thread
    History {
        /// Thread id, e.g. merchant_mch_789456_20250109_143022
        thread_id: String,
        /// Number of turns to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show checkpoint count and id range for a thread
    Info {
        /// Thread id
        thread_id: String,
    },
    /// Delete all checkpoints of one thread
    Clear {
        /// Thread id
        thread_id: String,
        /// Skip the confirmation guard
        #[arg(long)]
        yes: bool,
    },
    /// Delete every checkpoint in the store
    #[command(long_about = "\
Delete every checkpoint in the store.

This cannot be undone. Pass --yes to confirm.

Examples:
  merchant-advisor checkpoints clear-all --yes")]
    ClearAll {
        /// Skip the confirmation guard
        #[arg(long)]
        yes: bool,
    },
}
