/// Log tags identify which subsystem produced a message.
///
/// Each tag maps to a --debug-<key> command-line flag that enables
/// debug-level output for just that subsystem.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Realtime,
    Channels,
    Poller,
    Direct,
    Api,
    Test,
    Other(String),
}

impl LogTag {
    /// Key used for the --debug-<key> flag and enabled-tag matching
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::Config => "config".to_string(),
            LogTag::Realtime => "realtime".to_string(),
            LogTag::Channels => "channels".to_string(),
            LogTag::Poller => "poller".to_string(),
            LogTag::Direct => "direct".to_string(),
            LogTag::Api => "api".to_string(),
            LogTag::Test => "test".to_string(),
            LogTag::Other(s) => s.to_lowercase(),
        }
    }

    /// Uncolored tag text for plain output
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::System => "SYSTEM".to_string(),
            LogTag::Config => "CONFIG".to_string(),
            LogTag::Realtime => "REALTIME".to_string(),
            LogTag::Channels => "CHANNELS".to_string(),
            LogTag::Poller => "POLLER".to_string(),
            LogTag::Direct => "DIRECT".to_string(),
            LogTag::Api => "API".to_string(),
            LogTag::Test => "TEST".to_string(),
            LogTag::Other(s) => s.to_uppercase(),
        }
    }
}
