// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod approval;
pub mod builtin;
pub mod events;
pub mod image_util;
pub mod registry;
pub mod tool;

pub use approval::{ApprovalError, ApprovalManager, ApprovalResult, PromptFn, PromptRequest};
pub use events::ToolEvent;
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{ApprovalKind, Tool, ToolCall, ToolOutput, ToolOutputPart};

pub use builtin::activate_skill::{ActivateSkillTool, SkillSpec};
pub use builtin::ask_user::{AskUserTool, PauseHook, QuestionRequest};
pub use builtin::edit_file::EditFileTool;
pub use builtin::find::FindTool;
pub use builtin::grep::GrepTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::read_url::ReadUrlTool;
pub use builtin::set_output::SetOutputTool;
pub use builtin::shell::ShellTool;
pub use builtin::view_image::ViewImageTool;
pub use builtin::web_search::WebSearchTool;
pub use builtin::write_file::WriteFileTool;
