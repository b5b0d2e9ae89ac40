//! CLI command-name contract for logging.

use crate::cli::parse::{CheckpointCommands, Commands, FrameCommands};

/// Command name string for log spans (e.g. "frame.start", "checkpoint.list").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Capture { .. } => "capture".to_string(),
        Commands::Get { .. } => "get".to_string(),
        Commands::Query { .. } => "query".to_string(),
        Commands::Recall { .. } => "recall".to_string(),
        Commands::Frame { command } => format!("frame.{}", frame_command_name(command)),
        Commands::Decay { .. } => "decay".to_string(),
        Commands::Prune { .. } => "prune".to_string(),
        Commands::Checkpoint { command } => {
            format!("checkpoint.{}", checkpoint_command_name(command))
        }
        Commands::Rehydrate { .. } => "rehydrate".to_string(),
        Commands::Detect { .. } => "detect".to_string(),
        Commands::Maintain => "maintain".to_string(),
        Commands::Status { .. } => "status".to_string(),
        Commands::Config { .. } => "config".to_string(),
    }
}

pub fn frame_command_name(command: &FrameCommands) -> &'static str {
    match command {
        FrameCommands::Start { .. } => "start",
        FrameCommands::Close { .. } => "close",
        FrameCommands::Abort { .. } => "abort",
        FrameCommands::Show { .. } => "show",
        FrameCommands::List { .. } => "list",
        FrameCommands::Tree => "tree",
    }
}

pub fn checkpoint_command_name(command: &CheckpointCommands) -> &'static str {
    match command {
        CheckpointCommands::Create { .. } => "create",
        CheckpointCommands::List { .. } => "list",
        CheckpointCommands::Consume { .. } => "consume",
    }
}
