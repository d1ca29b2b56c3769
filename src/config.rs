use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "seed-reactor",
    version,
    about = "Audio-reactive generative visualizer with shareable parameter seeds"
)]
pub struct Config {
    #[arg(long, value_enum, default_value_t = AudioSource::Mic)]
    pub source: AudioSource,

    #[arg(long)]
    pub device: Option<String>,

    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    #[arg(long, value_enum, default_value_t = FormatMode::Auto)]
    pub format: FormatMode,

    #[arg(long, value_enum, default_value_t = RendererMode::HalfBlock)]
    pub renderer: RendererMode,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_probe: bool,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sync_updates: bool,

    /// Restore a full parameter set from a shared seed (SR-...). Overrides
    /// the individual parameter flags below.
    #[arg(long)]
    pub seed: Option<String>,

    #[arg(long, default_value_t = 0.5)]
    pub dose: f32,

    #[arg(long, default_value_t = 0.3)]
    pub symmetry: f32,

    #[arg(long, default_value_t = 0.3)]
    pub recursion: f32,

    #[arg(long, default_value_t = 0.4)]
    pub breathing: f32,

    #[arg(long, default_value_t = 0.3)]
    pub flow: f32,

    #[arg(long, default_value_t = 0.6)]
    pub saturation: f32,

    #[arg(long, default_value_t = 0.0)]
    pub echo: f32,

    #[arg(long, default_value_t = 0.0)]
    pub drift: f32,

    #[arg(long = "break", default_value_t = 0.0)]
    pub break_level: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioSource {
    Mic,
    /// No live input: the extractor emits its synthetic idle signal.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RendererMode {
    #[value(name = "half-block", alias = "halfblock", alias = "half_block", alias = "hb")]
    HalfBlock,
    #[value(alias = "text")]
    Ascii,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatMode {
    Auto,
    F32,
    F16,
    U8,
}
