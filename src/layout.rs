//! Text layout for the quote overlay: greedy word wrap, per-line placement
//! and the `drawtext` filter strings handed to ffmpeg.

use std::path::Path;

pub const DEFAULT_WRAP_CHARS: usize = 25;

/// Frame and typography for the rendered clip.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub width: u32,
    pub height: u32,
    pub duration_s: u32,
    pub font_size: u32,
    pub x_fraction: f64,
    pub y_start: f64,
    pub y_step: f64,
    pub fade_start: f64,
    pub fade_end: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            duration_s: 10,
            font_size: 65,
            x_fraction: 0.05,
            y_start: 0.12,
            y_step: 0.065,
            fade_start: 1.0,
            fade_end: 2.0,
        }
    }
}

/// One wrapped line with its vertical position (fraction of frame height)
/// and fade window in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLine {
    pub text: String,
    pub y_fraction: f64,
    pub fade_start: f64,
    pub fade_end: f64,
}

/// Greedy wrap: a word joins the current line while the line, including the
/// separating space, stays within `max_chars`. A word longer than the limit
/// gets a line to itself.
pub fn wrap_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_chars = 0usize;

    for word in text.split_whitespace() {
        let word_chars = word.chars().count();
        if line.is_empty() {
            line.push_str(word);
            line_chars = word_chars;
        } else if line_chars + 1 + word_chars <= max_chars {
            line.push(' ');
            line.push_str(word);
            line_chars += 1 + word_chars;
        } else {
            lines.push(std::mem::take(&mut line));
            line.push_str(word);
            line_chars = word_chars;
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

pub fn build_overlay(lines: &[String], style: &OverlayStyle) -> Vec<OverlayLine> {
    lines
        .iter()
        .enumerate()
        .map(|(i, text)| OverlayLine {
            text: text.clone(),
            y_fraction: style.y_start + i as f64 * style.y_step,
            fade_start: style.fade_start,
            fade_end: style.fade_end,
        })
        .collect()
}

/// Makes `text` safe inside a single-quoted `drawtext` value. The filter is
/// emitted with `expansion=none`, so `%` needs no escaping.
pub fn sanitize_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => {}
            '\'' => out.push('’'),
            ':' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Escapes a path for a single-quoted filter value. The graph parser strips
/// the quotes, the option parser then unescapes `\\`, `:` and `'`.
pub fn escape_filter_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        match ch {
            '\\' | ':' => {
                out.push('\\');
                out.push(ch);
            }
            // Close the quote, emit an escaped quote, reopen.
            '\'' => out.push_str("\\'\\''"),
            _ => out.push(ch),
        }
    }
    out
}

fn alpha_expr(line: &OverlayLine) -> String {
    let window = (line.fade_end - line.fade_start).max(0.001);
    format!(
        "if(lt(t\\,{s})\\,0\\,if(lt(t\\,{e})\\,(t-{s})/{w}\\,1))",
        s = line.fade_start,
        e = line.fade_end,
        w = window
    )
}

pub fn drawtext_filter(line: &OverlayLine, style: &OverlayStyle, font: &Path) -> String {
    format!(
        "drawtext=fontfile='{}':text='{}':expansion=none:fontcolor=white:fontsize={}:x=w*{}:y=h*{:.3}:alpha='{}'",
        escape_filter_path(&font.display().to_string()),
        sanitize_drawtext(&line.text),
        style.font_size,
        style.x_fraction,
        line.y_fraction,
        alpha_expr(line)
    )
}

/// Joins the per-line filters into one `-vf` chain.
pub fn filter_chain(overlay: &[OverlayLine], style: &OverlayStyle, font: &Path) -> String {
    overlay
        .iter()
        .map(|line| drawtext_filter(line, style, font))
        .collect::<Vec<_>>()
        .join(",")
}
