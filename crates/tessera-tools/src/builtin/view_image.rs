// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool that loads an image file and returns it as a vision-capable content
//! part, resizing and re-encoding it as needed.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::image_util;
use crate::tool::{ApprovalKind, Tool, ToolCall, ToolOutput, ToolOutputPart};

pub struct ViewImageTool;

#[async_trait]
impl Tool for ViewImageTool {
    fn name(&self) -> &str {
        "view_image"
    }

    fn description(&self) -> &str {
        "View an image file (PNG, JPEG, GIF, WebP, BMP, TIFF). The image is downscaled to fit \
         within 2048x2048 and returned as a vision-capable content part. \
         Use read_file for text/code files; use this only for genuine images \
         (screenshots, diagrams, photos)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the image file"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn approval_kind(&self, call: &ToolCall) -> Option<ApprovalKind> {
        let path = call.args.get("path").and_then(|v| v.as_str())?;
        Some(ApprovalKind::ReadFile(std::path::PathBuf::from(path)))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };

        debug!(path = %path, "view_image tool");

        let ext = std::path::Path::new(&path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if !image_util::is_image_extension(&ext) {
            return ToolOutput::err(&call.id, format!("'{path}' does not look like an image file"));
        }

        match image_util::load_image(std::path::Path::new(&path)) {
            Ok(img) => ToolOutput::with_parts(
                &call.id,
                vec![
                    ToolOutputPart::Text(format!("viewed image: {path}")),
                    ToolOutputPart::Image(img.into_data_url()),
                ],
            ),
            Err(e) => ToolOutput::err(&call.id, format!("could not load image: {e}")),
        }
    }
}
