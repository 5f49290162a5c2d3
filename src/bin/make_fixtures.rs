// Writes the synthetic WAV fixtures used to exercise the extractor end to end

use std::path::PathBuf;

use beat_extractor::synth;

const SAMPLE_RATE: u32 = 44100;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("fixtures"));
    std::fs::create_dir_all(&out_dir)?;

    println!("🎵 Generating Beat-Extractor fixtures in {}", out_dir.display());

    let silence = synth::silence(5.0, SAMPLE_RATE);
    let silence_path = out_dir.join("silence.wav");
    synth::write_wav(&silence_path, &silence)?;
    println!("   ✅ {} ({:.1}s of digital silence)", silence_path.display(), silence.duration());

    let clicks = synth::click_track(10.0, 120.0, 0.0, SAMPLE_RATE);
    let clicks_path = out_dir.join("click_track_120bpm.wav");
    synth::write_wav(&clicks_path, &clicks)?;
    println!("   ✅ {} ({:.1}s at 120 BPM)", clicks_path.display(), clicks.duration());

    println!("\nTry: beat-extractor {} beats.txt --mode beat", clicks_path.display());
    Ok(())
}
