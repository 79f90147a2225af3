// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tracks the turn's rendering segments — streamed text, tool calls, images,
//! diffs — independent of whatever terminal or TUI eventually renders them
//! (§4.6). The Engine feeds it events; a host UI pulls completed segments out
//! at its own pace.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallStatus {
    Pending,
    Done { success: bool },
}

#[derive(Debug, Clone)]
pub enum Segment {
    Text(String),
    ToolCall { call_id: String, name: String, info: String, status: ToolCallStatus },
    Image { path: String },
    Diff { path: String, old: String, new: String },
}

/// Ordered list of segments for one turn loop, with a cursor marking how much
/// has already been flushed to the host's scrollback.
///
/// Rendering is width-dependent: `render_cache` holds one rendered string per
/// `(segment_index, width)` pair so a host redrawing the same live view at a
/// stable width never re-renders it, and is cleared whenever the width changes.
pub struct ToolTracker {
    segments: Vec<Segment>,
    flushed_up_to: usize,
    /// Index of the in-progress streaming text segment, if one is open.
    open_text: Option<usize>,
    /// Animation tick for in-flight tool calls (e.g. a spinner wave).
    wave_pos: usize,
    last_width: usize,
    render_cache: HashMap<(usize, usize), String>,
}

impl Default for ToolTracker {
    fn default() -> Self {
        Self {
            segments: Vec::new(),
            flushed_up_to: 0,
            open_text: None,
            wave_pos: 0,
            last_width: 0,
            render_cache: HashMap::new(),
        }
    }
}

impl ToolTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to (or open) the current streaming text segment.
    pub fn add_text_delta(&mut self, delta: &str) {
        match self.open_text {
            Some(idx) => {
                if let Segment::Text(s) = &mut self.segments[idx] {
                    s.push_str(delta);
                }
            }
            None => {
                self.open_text = Some(self.segments.len());
                self.segments.push(Segment::Text(delta.to_string()));
            }
        }
    }

    /// Close the currently open streaming text segment, if any, invoking
    /// `render` to produce and cache its rendered form at the last-seen
    /// width. A subsequent `add_text_delta` starts a fresh segment.
    pub fn mark_current_text_complete<R>(&mut self, render: R)
    where
        R: Fn(&str) -> String,
    {
        if let Some(idx) = self.open_text.take() {
            if let Segment::Text(s) = &self.segments[idx] {
                let rendered = render(s);
                self.render_cache.insert((idx, self.last_width), rendered);
            }
        }
    }

    /// Close the open text segment without rendering it. Used by internal
    /// transitions (a tool call starting, an image/diff segment arriving)
    /// that have no renderer in scope; the segment is rendered lazily, on
    /// first request, by `flush_to_scrollback`.
    fn close_open_text(&mut self) {
        self.open_text = None;
    }

    /// Idempotent: a repeat start for a `call_id` already tracked is ignored.
    pub fn handle_tool_start(&mut self, call_id: &str, name: &str, info: &str) {
        if self.find_tool_call(call_id).is_some() {
            return;
        }
        self.close_open_text();
        self.segments.push(Segment::ToolCall {
            call_id: call_id.to_string(),
            name: name.to_string(),
            info: info.to_string(),
            status: ToolCallStatus::Pending,
        });
    }

    /// Idempotent: a repeat end for an already-completed call is ignored.
    pub fn handle_tool_end(&mut self, call_id: &str, success: bool) {
        if let Some(idx) = self.find_tool_call(call_id) {
            if let Segment::ToolCall { status, .. } = &mut self.segments[idx] {
                if matches!(status, ToolCallStatus::Pending) {
                    *status = ToolCallStatus::Done { success };
                }
            }
        }
    }

    pub fn add_image_segment(&mut self, path: impl Into<String>) {
        self.close_open_text();
        self.segments.push(Segment::Image { path: path.into() });
    }

    pub fn add_diff_segment(&mut self, path: impl Into<String>, old: impl Into<String>, new: impl Into<String>) {
        self.close_open_text();
        self.segments.push(Segment::Diff { path: path.into(), old: old.into(), new: new.into() });
    }

    fn find_tool_call(&self, call_id: &str) -> Option<usize> {
        self.segments.iter().position(|s| matches!(s, Segment::ToolCall { call_id: c, .. } if c == call_id))
    }

    /// All segments that will never change again (everything except an
    /// in-progress streaming text segment or a still-pending tool call).
    pub fn completed_segments(&self) -> Vec<&Segment> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(idx, seg)| match seg {
                Segment::Text(_) => Some(*idx) != self.open_text,
                Segment::ToolCall { status, .. } => matches!(status, ToolCallStatus::Done { .. }),
                Segment::Image { .. } | Segment::Diff { .. } => true,
            })
            .map(|(_, seg)| seg)
            .collect()
    }

    /// Segments still changing: the open text segment and any pending tool calls.
    pub fn active_segments(&self) -> Vec<&Segment> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(idx, seg)| match seg {
                Segment::Text(_) => Some(*idx) == self.open_text,
                Segment::ToolCall { status, .. } => matches!(status, ToolCallStatus::Pending),
                _ => false,
            })
            .map(|(_, seg)| seg)
            .collect()
    }

    /// Completed segments not yet handed to the host's scrollback.
    pub fn unflushed_segments(&self) -> &[Segment] {
        &self.segments[self.flushed_up_to..]
    }

    /// Clears the render cache whenever the live view is asked to draw at a
    /// different width than last time (§4.6: "invalidated on terminal resize").
    fn sync_width(&mut self, width: usize) {
        if self.last_width != width {
            self.render_cache.clear();
            self.last_width = width;
        }
    }

    fn render_cached<R>(&mut self, idx: usize, width: usize, seg: &Segment, render: &R) -> String
    where
        R: Fn(&Segment, usize) -> String,
    {
        if let Some(cached) = self.render_cache.get(&(idx, width)) {
            return cached.clone();
        }
        let rendered = render(seg, width);
        self.render_cache.insert((idx, width), rendered.clone());
        rendered
    }

    /// Finds a prefix of stable (non-pending, non-open) segments whose
    /// combined rendered line count pushes the live view past
    /// `max_live_lines`, renders and removes exactly that prefix from the
    /// live view, and returns it as one scrollback-ready string. Returns an
    /// empty string when the live view is still within budget.
    pub fn flush_to_scrollback<R>(&mut self, width: usize, max_live_lines: usize, render: R) -> String
    where
        R: Fn(&Segment, usize) -> String,
    {
        self.sync_width(width);

        let complete_end = match self.open_text {
            Some(idx) => idx,
            None => self.segments.len(),
        };
        // Don't flush a still-pending tool call even if it's before the open
        // text cursor.
        let boundary = self.segments[self.flushed_up_to..complete_end]
            .iter()
            .position(|s| matches!(s, Segment::ToolCall { status: ToolCallStatus::Pending, .. }))
            .map(|rel| self.flushed_up_to + rel)
            .unwrap_or(complete_end);

        let stable_start = self.flushed_up_to;
        let rendered: Vec<String> = (stable_start..boundary)
            .map(|idx| {
                let seg = self.segments[idx].clone();
                self.render_cached(idx, width, &seg, &render)
            })
            .collect();

        let total_lines: usize = rendered.iter().map(|r| r.lines().count().max(1)).sum();
        if total_lines <= max_live_lines || rendered.is_empty() {
            return String::new();
        }

        // Keep as many of the most recent rendered segments as fit in the
        // budget; flush everything before that.
        let mut kept_lines = 0usize;
        let mut flush_count = rendered.len();
        for (rel, r) in rendered.iter().enumerate().rev() {
            let n = r.lines().count().max(1);
            if kept_lines + n > max_live_lines {
                flush_count = rel + 1;
                break;
            }
            kept_lines += n;
            flush_count = rel;
        }

        let out = rendered[..flush_count].join("\n");
        self.flushed_up_to = stable_start + flush_count;
        out
    }

    /// Text accumulated so far in the currently-open streaming segment, with
    /// no rendering or cut-point side effects.
    pub fn flush_streaming_text(&self) -> Option<&str> {
        match self.open_text {
            Some(idx) => match &self.segments[idx] {
                Segment::Text(s) => Some(s.as_str()),
                _ => None,
            },
            None => None,
        }
    }

    /// Once the open streaming text segment exceeds `threshold_bytes`,
    /// renders it, caches the render, closes it as a cut-point, and advances
    /// the flush cursor past it so a fresh segment starts accumulating —
    /// bounding how much live streaming text a host keeps in memory.
    pub fn cut_streaming_text_at_threshold<R>(
        &mut self,
        threshold_bytes: usize,
        width: usize,
        render: R,
    ) -> Option<String>
    where
        R: Fn(&str, usize) -> String,
    {
        self.sync_width(width);
        let idx = self.open_text?;
        let text = match &self.segments[idx] {
            Segment::Text(s) => s,
            _ => return None,
        };
        if text.len() < threshold_bytes {
            return None;
        }

        let rendered = render(text, width);
        self.render_cache.insert((idx, width), rendered.clone());
        self.open_text = None;
        if self.flushed_up_to <= idx {
            self.flushed_up_to = idx + 1;
        }
        Some(rendered)
    }

    /// Advance the wave animation tick, returning the new position.
    pub fn tick_wave(&mut self) -> usize {
        self.wave_pos = self.wave_pos.wrapping_add(1);
        self.wave_pos
    }
}
