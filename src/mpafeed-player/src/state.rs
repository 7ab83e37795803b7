/// Lifecycle of one playback, as observed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Handle built, engine thread not yet running.
    #[default]
    Created,
    /// Opening the stream and looking for a decodable format.
    Negotiating,
    /// The audio output accepted the format and blocks are being written.
    Playing,
    /// A stop was requested; the engine has not yet finished.
    Stopping,
    /// The engine thread finished and released everything.
    Terminated,
}

impl PlaybackState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Stopping` may be entered from any live state, and every state may
    /// terminate. `Terminated` is final.
    pub fn can_advance_to(self, next: PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Created, Negotiating) | (Negotiating, Playing) => true,
            (Created | Negotiating | Playing, Stopping) => true,
            _ => false,
        }
    }

    pub fn is_live(self) -> bool {
        !matches!(self, PlaybackState::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Created => "created",
            PlaybackState::Negotiating => "negotiating",
            PlaybackState::Playing => "playing",
            PlaybackState::Stopping => "stopping",
            PlaybackState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
