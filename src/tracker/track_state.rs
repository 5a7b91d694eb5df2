/// Lifecycle of a track.
///
/// Tracks start `Tentative` and become `Confirmed` once they have been
/// matched `min_hits` times. There is no way back; tracks that go unmatched
/// for too long are dropped from the tracker instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Seen fewer than `min_hits` times, not reported to callers
    #[default]
    Tentative,
    /// Reported to callers until evicted
    Confirmed,
}
