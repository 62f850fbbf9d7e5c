/// Reserved room every client joins on connect. Carries discovery and
/// invite traffic; the relay fans it out to every connection.
pub const SIGNALING_ROOM: &str = "varta_global_signaling";

/// Well-known name of the same-origin cross-tab channel.
pub const TAB_CHANNEL_NAME: &str = "varta_mesh";

/// Default relay port (matches the historical socket server)
pub const DEFAULT_RELAY_PORT: u16 = 3000;

/// Default WebSocket path on the relay
pub const RELAY_WS_PATH: &str = "/ws";

/// How long a discovery PING waits for its PONG, in milliseconds
pub const DISCOVERY_TIMEOUT_MS: u64 = 5_000;

/// First reconnect delay, in milliseconds
pub const RECONNECT_INITIAL_MS: u64 = 1_000;

/// Upper bound for the reconnect backoff, in milliseconds
pub const RECONNECT_MAX_MS: u64 = 30_000;

/// Room id prefixes. A room id's prefix determines its kind.
pub const DM_PREFIX: &str = "dm_";
pub const GROUP_PREFIX: &str = "group_";
pub const GLOBAL_PREFIX: &str = "gid_";
pub const CLAN_PREFIX: &str = "cid_";

/// Prefix of locally generated stable user ids
pub const USER_PREFIX: &str = "uid_";

/// Prefix of message ids
pub const MESSAGE_PREFIX: &str = "msg_";

/// Settings key holding the serialized session identity
pub const SETTING_SESSION_IDENTITY: &str = "session.identity";

/// Settings key holding the last selected UI theme
pub const SETTING_THEME: &str = "ui.theme";

/// Theme used when none was ever selected
pub const DEFAULT_THEME: &str = "nexus";

/// Maximum accepted frame size on the relay socket (256 KiB)
pub const MAX_FRAME_SIZE: usize = 262_144;
