// Fetch adapter implementations
//
// yt-dlp is the only production adapter. Tests drive the pipeline with in-memory
// adapters implementing the same trait.

mod ytdlp;

pub use ytdlp::{ParsedInfo, YtDlpAdapter, YtDlpConfig};
