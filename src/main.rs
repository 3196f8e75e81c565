use std::process;

use clap::Parser;
use reqwest::Url;
use tracing::{error, info};

use mailbridge::chat::MattermostConnector;
use mailbridge::compose::MailComposer;
use mailbridge::config::Settings;
use mailbridge::error::ConfigError;
use mailbridge::mail::SmtpMailer;
use mailbridge::markers::{ForwardMapping, parse_forward_mappings};
use mailbridge::supervisor;

/// Validate the configuration surface. Any failure here is fatal and the
/// dispatch core never starts.
fn load(settings: &Settings) -> Result<(Url, Vec<ForwardMapping>, MailComposer), ConfigError> {
    let url = Url::parse(&settings.chat_url).map_err(|e| ConfigError::InvalidChatUrl {
        url: settings.chat_url.clone(),
        reason: e.to_string(),
    })?;

    let mappings = parse_forward_mappings(&settings.forward)?;

    let composer = MailComposer::new(
        settings.mail_user.as_str(),
        &settings.mail_subject,
        &settings.mail_body,
    )?;

    Ok((url, mappings, composer))
}

#[tokio::main]
async fn main() {
    let settings = Settings::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_level())),
        )
        .with_target(false)
        .init();

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        error!("failed to install rustls crypto provider");
        process::exit(1);
    }

    let (url, mappings, composer) = match load(&settings) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let mailer = SmtpMailer::new(
        settings.mail_host.as_str(),
        settings.mail_port,
        settings.mail_user.as_str(),
        settings.mail_pass.as_str(),
    );
    let connector = MattermostConnector::new(
        url,
        settings.chat_user.as_str(),
        settings.chat_pass.as_str(),
    );

    info!("startup - mailbridge v{}", env!("CARGO_PKG_VERSION"));
    supervisor::run(
        &connector,
        &mailer,
        &composer,
        &mappings,
        settings.mail_use_tls,
    )
    .await;
}
