//! Named audio presets, expressed as lavfi filter graphs the player applies
//! via `af set`.  The chain is rebuilt whenever the preset or the loudness
//! normalization flag changes.

/// `(name, label, filters)` — filters joined into one lavfi graph.
const PRESETS: &[(&str, &str, &[&str])] = &[
    ("flat", "Flat", &[]),
    ("bass", "Bass Boost", &["bass=g=6:f=110"]),
    (
        "vintage",
        "Vintage Speaker",
        &["highpass=f=200", "lowpass=f=5000", "bass=g=-3", "treble=g=2"],
    ),
    (
        "night",
        "Night Mode",
        &["acompressor=threshold=-21dB:ratio=4:makeup=4dB"],
    ),
];

const LOUDNORM_FILTER: &str = "loudnorm=I=-16:TP=-1.5:LRA=11";

pub fn is_valid(name: &str) -> bool {
    PRESETS.iter().any(|(n, _, _)| *n == name)
}

pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|(n, _, _)| *n).collect()
}

/// Build the full filter chain for a preset plus the loudness flag.
/// Empty string means "no filters" and clears the player's filter graph.
pub fn filter_chain(preset: &str, loudness_normalization: bool) -> String {
    let mut filters: Vec<&str> = PRESETS
        .iter()
        .find(|(n, _, _)| *n == preset)
        .map(|(_, _, f)| f.to_vec())
        .unwrap_or_default();

    if loudness_normalization {
        filters.push(LOUDNORM_FILTER);
    }

    if filters.is_empty() {
        String::new()
    } else {
        format!("lavfi=[{}]", filters.join(","))
    }
}
