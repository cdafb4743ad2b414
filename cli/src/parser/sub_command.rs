use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use gpgmux_core::pgp::SignMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SignModeArg {
    Normal,
    Clear,
    Detached,
}

impl From<SignModeArg> for SignMode {
    fn from(value: SignModeArg) -> Self {
        match value {
            SignModeArg::Normal => SignMode::Normal,
            SignModeArg::Clear => SignMode::Clear,
            SignModeArg::Detached => SignMode::Detached,
        }
    }
}

#[derive(Subcommand)]
pub enum SubCommands {
    /// Print the detected GnuPG version.
    Version,

    /// Encrypt data for one or more recipients.
    Encrypt {
        /// Recipient key id, fingerprint or email address.
        #[arg(short = 'r', long = "recipient", required = true)]
        recipients: Vec<String>,

        /// Also sign with this key.
        #[arg(short = 'u', long = "local-user")]
        signers: Vec<String>,

        /// File holding the passphrase of the signing keys.
        #[arg(long = "passphrase-file", value_name = "FILE", requires = "signers")]
        passphrase_file: Option<PathBuf>,

        /// Write to FILE instead of standard output.
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,

        /// Input file, standard input when omitted.
        input: Option<PathBuf>,
    },

    /// Decrypt data, optionally verifying embedded signatures.
    Decrypt {
        /// Decryption key. Every secret key in the keyring when omitted.
        #[arg(short = 'k', long = "key")]
        keys: Vec<String>,

        /// File holding the passphrase of the decryption keys.
        #[arg(long = "passphrase-file", value_name = "FILE")]
        passphrase_file: Option<PathBuf>,

        /// Report signatures found in the decrypted message.
        #[arg(long = "verify")]
        verify: bool,

        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,

        input: Option<PathBuf>,
    },

    /// Sign data.
    Sign {
        #[arg(short = 'u', long = "local-user", required = true)]
        signers: Vec<String>,

        #[arg(short = 'm', long = "mode", value_enum, default_value_t = SignModeArg::Normal)]
        mode: SignModeArg,

        #[arg(long = "passphrase-file", value_name = "FILE")]
        passphrase_file: Option<PathBuf>,

        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,

        input: Option<PathBuf>,
    },

    /// Verify signed data, or data against a detached signature.
    Verify {
        /// Detached signature of the input.
        #[arg(short = 's', long = "signature", value_name = "FILE")]
        signature: Option<PathBuf>,

        input: Option<PathBuf>,
    },

    /// Import public or private keys.
    Import {
        input: Option<PathBuf>,
    },

    /// Export a public key.
    Export {
        key_id: String,

        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Delete a public key, or with `--secret` the private key first.
    Delete {
        key_id: String,

        #[arg(long = "secret")]
        secret: bool,
    },

    /// Generate a key pair and print its fingerprint.
    #[command(name = "gen-key")]
    GenKey {
        #[arg(short = 'n', long = "name")]
        name: String,

        #[arg(short = 'e', long = "email")]
        email: String,

        /// Protect the key with the passphrase in FILE.
        #[arg(long = "passphrase-file", value_name = "FILE")]
        passphrase_file: Option<PathBuf>,
    },
}
