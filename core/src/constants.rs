pub mod default_constants {
    pub const PGP_EXECUTABLE: &str = "gpg";
    pub const AGENT_EXECUTABLE: &str = "gpg-agent";
    pub const GPGCONF_EXECUTABLE: &str = "gpgconf";
    pub const PINENTRY_EXECUTABLE: &str = "gpgmux-pinentry";

    /// Matches the pipe read granularity of the platform, smaller chunks only
    /// cost extra syscalls.
    pub const CHUNK_SIZE: usize = 8192;

    pub const STATUS_PREFIX: &[u8] = b"[GNUPG:] ";
    pub const FIXED_LOCALE: &str = "C";

    pub const MIN_VERSION: &str = "1.0.2";
    pub const AGENT_VERSION: &str = "2.0.0";
    pub const STANDARD_SOCKET_VERSION: &str = "2.1.0";

    pub const AGENT_POLL_INTERVAL_MS: u64 = 10;
    pub const AGENT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;
}

pub mod fd_numbers {
    pub const FD_STATUS: i32 = 3;
    pub const FD_COMMAND: i32 = 4;
    pub const FD_MESSAGE: i32 = 5;
}

pub mod env_variables {
    pub const LOG_LEVEL_VAR: &str = "GPGMUX_LOG_LEVEL";
    pub const CONFIG_PATH_ENV: &str = "GPGMUX_CONFIG_PATH";
    pub const PINENTRY_USER_DATA: &str = "PINENTRY_USER_DATA";
    pub const GPG_AGENT_INFO: &str = "GPG_AGENT_INFO";
    pub const LC_ALL: &str = "LC_ALL";
}
