pub mod source; // Image acquisition: path, URL, bytes, phone camera
pub mod vision; // Remote vision-language clients
pub mod analysis; // Crop identification, classification, narration, orchestration
