//! Audio and subtitle track selection by language preference.

use bf_core::config::EncodingConfig;
use bf_core::StreamKind;
use bf_probe::{MediaDescriptor, StreamInfo};
use serde::Serialize;

/// Why a track was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MatchRule {
    /// Matched the preference list at position `rank` (0 = most preferred).
    PreferredLanguage { rank: usize },
    /// Appended because some preferred language was missing.
    FallbackNonPreferred,
    /// Kept so a source with audio never produces a silent encode.
    FirstAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedTrack {
    /// Stream index in the source container.
    pub index: u32,
    /// Normalized ISO 639-2 tag, if the stream had one.
    pub language: Option<String>,
    pub rule: MatchRule,
}

/// Chosen streams, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackSelection {
    pub audio: Vec<SelectedTrack>,
    pub subtitles: Vec<SelectedTrack>,
}

impl TrackSelection {
    pub fn audio_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.audio.iter().map(|t| t.index)
    }

    pub fn subtitle_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.subtitles.iter().map(|t| t.index)
    }
}

const ISO_639_1: &[(&str, &str)] = &[
    ("ar", "ara"),
    ("cs", "ces"),
    ("da", "dan"),
    ("de", "deu"),
    ("el", "ell"),
    ("en", "eng"),
    ("es", "spa"),
    ("fi", "fin"),
    ("fr", "fra"),
    ("he", "heb"),
    ("hi", "hin"),
    ("hu", "hun"),
    ("it", "ita"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("nl", "nld"),
    ("no", "nor"),
    ("pl", "pol"),
    ("pt", "por"),
    ("ru", "rus"),
    ("sv", "swe"),
    ("th", "tha"),
    ("tr", "tur"),
    ("uk", "ukr"),
    ("zh", "zho"),
];

/// Bibliographic codes folded onto their terminology twins.
const BIBLIOGRAPHIC: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("chi", "zho"),
    ("dut", "nld"),
    ("cze", "ces"),
    ("gre", "ell"),
];

/// Normalize a language tag to lowercase ISO 639-2/T.
///
/// Returns `None` for empty or undetermined tags.
pub fn normalize_language(tag: &str) -> Option<String> {
    let tag = tag.trim().to_ascii_lowercase();
    if tag.is_empty() || tag == "und" {
        return None;
    }
    let lookup = |table: &[(&str, &str)]| {
        table
            .iter()
            .find(|(from, _)| *from == tag)
            .map(|(_, to)| (*to).to_string())
    };
    Some(lookup(ISO_639_1).or_else(|| lookup(BIBLIOGRAPHIC)).unwrap_or(tag))
}

/// Rank `streams` against `preferences`.
///
/// Within one language, non-commentary tracks come first, then (for audio)
/// higher channel counts, then original order. Non-preferred languages are
/// appended in original order when `copy_fallback` is set and at least one
/// preferred language had no match.
pub fn rank_streams(
    streams: &[&StreamInfo],
    preferences: &[String],
    copy_fallback: bool,
) -> Vec<SelectedTrack> {
    let mut prefs: Vec<String> = Vec::new();
    for p in preferences.iter().filter_map(|p| normalize_language(p)) {
        if !prefs.contains(&p) {
            prefs.push(p);
        }
    }

    let languages: Vec<Option<String>> = streams
        .iter()
        .map(|s| s.language.as_deref().and_then(normalize_language))
        .collect();

    let mut selected = Vec::new();
    let mut missing_preferred = false;

    for (rank, pref) in prefs.iter().enumerate() {
        let mut matched: Vec<(usize, &StreamInfo)> = streams
            .iter()
            .enumerate()
            .filter(|(i, _)| languages[*i].as_ref() == Some(pref))
            .map(|(i, s)| (i, *s))
            .collect();

        if matched.is_empty() {
            missing_preferred = true;
            continue;
        }

        matched.sort_by_key(|(pos, s)| {
            let channels = if s.kind == StreamKind::Audio {
                s.channels.unwrap_or(0)
            } else {
                0
            };
            (s.is_commentary(), std::cmp::Reverse(channels), *pos)
        });

        selected.extend(matched.into_iter().map(|(i, s)| SelectedTrack {
            index: s.index,
            language: languages[i].clone(),
            rule: MatchRule::PreferredLanguage { rank },
        }));
    }

    if copy_fallback && missing_preferred {
        selected.extend(
            streams
                .iter()
                .enumerate()
                .filter(|(i, _)| !languages[*i].as_ref().is_some_and(|l| prefs.contains(l)))
                .map(|(i, s)| SelectedTrack {
                    index: s.index,
                    language: languages[i].clone(),
                    rule: MatchRule::FallbackNonPreferred,
                }),
        );
    }

    selected
}

/// Choose the audio and subtitle tracks of a feature.
///
/// A source with at least one audio stream always yields at least one
/// selected audio track.
pub fn select_tracks(descriptor: &MediaDescriptor, config: &EncodingConfig) -> TrackSelection {
    let preferences = config.languages();

    let audio_streams: Vec<&StreamInfo> = descriptor.streams_of(StreamKind::Audio).collect();
    let subtitle_streams: Vec<&StreamInfo> = descriptor.streams_of(StreamKind::Subtitle).collect();

    let mut audio = rank_streams(&audio_streams, &preferences, config.copy_audio);
    if audio.is_empty() {
        if let Some(first) = audio_streams.first() {
            tracing::warn!(
                "No audio track matches {:?}; keeping stream {}",
                preferences,
                first.index
            );
            audio.push(SelectedTrack {
                index: first.index,
                language: first.language.as_deref().and_then(normalize_language),
                rule: MatchRule::FirstAvailable,
            });
        }
    }

    let subtitles = rank_streams(&subtitle_streams, &preferences, config.copy_subtitles);

    tracing::debug!(
        "Selected {} audio and {} subtitle track(s)",
        audio.len(),
        subtitles.len()
    );
    TrackSelection { audio, subtitles }
}
