use crate::config::{FormatMode, RendererMode};

/// Per-channel storage precision for the simulation state buffers, in
/// fallback order: full float, half float, quantized byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFormat {
    F32,
    F16,
    U8,
}

impl StateFormat {
    pub fn bytes_per_channel(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
            Self::U8 => 1,
        }
    }

    /// Next lower-precision format to try, or `None` when this is already the
    /// minimum viable one.
    pub fn fallback(self) -> Option<Self> {
        match self {
            Self::F32 => Some(Self::F16),
            Self::F16 => Some(Self::U8),
            Self::U8 => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::U8 => "u8",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityReport {
    pub auto_probe: bool,
    pub requested_format: StateFormat,
    pub requested_renderer: RendererMode,
    pub format: StateFormat,
    pub renderer: RendererMode,
    notes: Vec<String>,
}

impl CapabilityReport {
    pub fn changed(&self) -> bool {
        self.format != self.requested_format || self.renderer != self.requested_renderer
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn record_format_fallback(&mut self, to: StateFormat, reason: impl Into<String>) {
        self.format = to;
        self.notes.push(reason.into());
    }

    pub fn status_label(&self) -> String {
        if !self.auto_probe {
            return format!(
                "off (format={}, renderer={:?})",
                self.format.label(),
                self.renderer
            );
        }
        if self.changed() {
            return format!(
                "fallback fmt {}->{}, ren {:?}->{:?}",
                self.requested_format.label(),
                self.format.label(),
                self.requested_renderer,
                self.renderer
            );
        }
        format!("ok fmt={}, ren={:?}", self.format.label(), self.renderer)
    }
}

pub fn probe_runtime(
    requested_format: FormatMode,
    requested_renderer: RendererMode,
    auto_probe: bool,
) -> CapabilityReport {
    let requested_format = match requested_format {
        FormatMode::Auto | FormatMode::F32 => StateFormat::F32,
        FormatMode::F16 => StateFormat::F16,
        FormatMode::U8 => StateFormat::U8,
    };

    let mut report = CapabilityReport {
        auto_probe,
        requested_format,
        requested_renderer,
        format: requested_format,
        renderer: requested_renderer,
        notes: Vec::new(),
    };

    if !auto_probe {
        report.push_note("capability probe disabled by --auto-probe=false");
        return report;
    }

    if let Some(forced) = forced_format() {
        report.format = forced;
        report.push_note(format!(
            "state format forced to {} by SEED_REACTOR_FORCE_FORMAT",
            forced.label()
        ));
    }

    if requested_renderer == RendererMode::HalfBlock && !truecolor_available() {
        report.renderer = RendererMode::Ascii;
        report.push_note("truecolor unavailable in this terminal; falling back to ascii renderer");
    }

    if report.notes.is_empty() {
        report.push_note("probe selected requested format/renderer with no fallback");
    }

    report
}

fn forced_format() -> Option<StateFormat> {
    let v = std::env::var("SEED_REACTOR_FORCE_FORMAT").ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "f32" => Some(StateFormat::F32),
        "f16" => Some(StateFormat::F16),
        "u8" => Some(StateFormat::U8),
        _ => None,
    }
}

fn truecolor_available() -> bool {
    if let Ok(v) = std::env::var("SEED_REACTOR_FORCE_TRUECOLOR") {
        let s = v.trim().to_ascii_lowercase();
        if s == "1" || s == "true" || s == "yes" || s == "on" {
            return true;
        }
        if s == "0" || s == "false" || s == "no" || s == "off" {
            return false;
        }
    }

    let colorterm = std::env::var("COLORTERM")
        .unwrap_or_default()
        .to_ascii_lowercase();
    if colorterm.contains("truecolor") || colorterm.contains("24bit") {
        return true;
    }

    let term = std::env::var("TERM")
        .unwrap_or_default()
        .to_ascii_lowercase();
    term.contains("direct") || term.contains("kitty") || term.contains("ghostty")
}
