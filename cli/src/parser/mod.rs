pub(crate) mod sub_command;

use std::path::PathBuf;

use clap::Parser;
use gpgmux_core::config::EngineConfig;
use sub_command::SubCommands;

use crate::command;
use crate::util::CmdResult;

#[derive(Parser)]
#[command(
    name = "gpgmux",
    about = "Encrypts, decrypts, signs and verifies data through a GnuPG subprocess",
    version = "0.1.0"
)]
pub struct CliParser {
    #[command(subcommand)]
    pub command: SubCommands,

    /// GnuPG home directory.
    #[arg(long = "homedir", global = true, value_name = "DIR")]
    pub homedir: Option<PathBuf>,

    /// GnuPG binary to run.
    #[arg(long = "binary", global = true, value_name = "PATH")]
    pub binary: Option<String>,

    /// Pinentry program handed to the agent.
    #[arg(long = "pinentry", global = true, value_name = "PATH")]
    pub pinentry: Option<String>,

    /// Config file, defaults to `GPGMUX_CONFIG_PATH` or ~/.config/gpgmux/config.toml.
    #[arg(long = "config", global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log every status and error line of the subprocess.
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    /// ASCII armored output.
    #[arg(short = 'a', long = "armor", global = true)]
    pub armor: bool,
}

impl CliParser {
    /// Command line options override the config file.
    pub fn apply_overrides(&self, mut config: EngineConfig) -> EngineConfig {
        if let Some(homedir) = &self.homedir {
            config.homedir = Some(homedir.clone());
        }
        if let Some(binary) = &self.binary {
            config.binary = binary.clone();
        }
        if let Some(pinentry) = &self.pinentry {
            config.pinentry = pinentry.clone();
        }
        config.debug |= self.debug;
        config
    }
}

pub fn handle_cli(config: EngineConfig, cli: CliParser) -> CmdResult {
    let config = cli.apply_overrides(config);
    let armor = cli.armor;

    match cli.command {
        SubCommands::Version => command::version::cmd_version(&config),
        SubCommands::Encrypt { recipients, signers, passphrase_file, output, input } => {
            command::encrypt::cmd_encrypt(
                &config,
                armor,
                &recipients,
                &signers,
                passphrase_file.as_ref(),
                output.as_ref(),
                input.as_deref(),
            )
        }
        SubCommands::Decrypt { keys, passphrase_file, verify, output, input } => {
            command::decrypt::cmd_decrypt(
                &config,
                &keys,
                passphrase_file.as_ref(),
                verify,
                output.as_ref(),
                input.as_deref(),
            )
        }
        SubCommands::Sign { signers, mode, passphrase_file, output, input } => {
            command::sign::cmd_sign(
                &config,
                armor,
                &signers,
                mode.into(),
                passphrase_file.as_ref(),
                output.as_ref(),
                input.as_deref(),
            )
        }
        SubCommands::Verify { signature, input } => {
            command::verify::cmd_verify(&config, signature.as_deref(), input.as_deref())
        }
        SubCommands::Import { input } => command::import::cmd_import(&config, input.as_deref()),
        SubCommands::Export { key_id, output } => {
            command::export::cmd_export(&config, armor, &key_id, output.as_ref())
        }
        SubCommands::Delete { key_id, secret } => {
            command::delete::cmd_delete(&config, &key_id, secret)
        }
        SubCommands::GenKey { name, email, passphrase_file } => {
            command::gen_key::cmd_gen_key(&config, &name, &email, passphrase_file.as_ref())
        }
    }
}
