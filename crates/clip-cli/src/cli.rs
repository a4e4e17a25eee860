use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "clip", version)]
pub struct Args {
    /// Resource to load and play on startup (path, file:// or http(s):// URL)
    pub resource: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Initial volume percent (0-100)
    #[arg(long, default_value_t = 100.0)]
    pub volume: f64,

    /// Delay before playback resumes after a seek, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub seek_resume_ms: u64,

    /// Per-request timeout for HTTP resources
    #[arg(long, default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Resampler input chunk size in frames
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,
}
