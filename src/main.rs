mod cli;

use clap::Parser;
use tracing::{error, info, warn};

use jsp_lsp_launcher::{ExtensionContext, Settings, activate, config, deactivate};

use crate::cli::{Args, TerminalHost, load_document};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    jsp_lsp_launcher::log::init()?;

    let settings_path = args.settings_path();
    let settings = Settings::load(&settings_path)?;
    let host = TerminalHost::new(settings_path, !args.no_prompt);

    let mut ctx = ExtensionContext::new(args.extension_path()?, settings)
        .with_workspace_root(std::env::current_dir()?);

    activate(&mut ctx, &host);
    let Some(client) = ctx.client().cloned() else {
        info!("Launcher did not start a client");
        std::process::exit(1);
    };

    info!("Started {} ({})", client.name(), client.id());

    match client.on_ready().await {
        Ok(()) => {
            for path in &args.files {
                match load_document(path) {
                    Ok(document) => match client.did_open(document).await {
                        Ok(true) => info!("Opened {}", path.display()),
                        Ok(false) => info!("Skipped {} (not a JSP document)", path.display()),
                        Err(e) => warn!("Failed to open {}: {}", path.display(), e),
                    },
                    Err(e) => eprintln!("warning: {:#}", e),
                }
            }
            eprintln!(
                "jsp-lsp running (log: {}), press Ctrl-C to stop",
                config::log_path().display()
            );
            tokio::signal::ctrl_c().await?;
        }
        Err(e) => {
            error!("Language server is not usable: {}", e);
            eprintln!("error: language server did not initialize: {}", e);
        }
    }

    deactivate(&mut ctx).await?;
    info!("Launcher stopped");
    Ok(())
}
