use std::path::Path;

use anyhow::{Context, Result};

use crate::{
    broker::{self, journal::Journal},
    cli::{Cli, Command},
    domain::{self, message::Message, summary::ChatSummary},
    infra::{self, storage_layout},
    transport, ui,
    usecases::{self, bootstrap},
};

pub fn run(cli: Cli) -> Result<()> {
    match cli.command_or_default() {
        Command::Serve { bind, ephemeral } => {
            let mut context = bootstrap::bootstrap(cli.config.as_deref(), ephemeral)?;
            log_module_boundaries();

            if let Some(bind) = bind {
                context.config.server.bind_addr = bind;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;

            runtime.block_on(transport::server::run_until_ctrl_c(
                &context.config.server.bind_addr,
                context.service.clone(),
                transport::wire::max_frame_bytes(context.config.store.max_message_chars),
            ))?;
            tracing::info!("chat server stopped");
        }
        Command::History { limit, viewer } => {
            let config = bootstrap::load_config(cli.config.as_deref(), false)?;
            infra::logging::init(&config.logging)?;
            log_module_boundaries();

            let path = storage_layout::journal_path(&config.store)?;
            for line in history_output(&path, &viewer, limit)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn log_module_boundaries() {
    tracing::debug!(
        ui = ui::module_name(),
        domain = domain::module_name(),
        broker = broker::module_name(),
        transport = transport::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );
}

/// Reads the journal without locking it, so history works while a server
/// holds the file.
fn history_output(path: &Path, viewer: &str, limit: Option<usize>) -> Result<Vec<String>> {
    let messages = Journal::read_all(path)?;
    tracing::debug!(path = %path.display(), messages = messages.len(), "journal read");

    Ok(render_history(&messages, viewer, limit))
}

fn render_history(messages: &[Message], viewer: &str, limit: Option<usize>) -> Vec<String> {
    let summary = ChatSummary::from_messages(messages);
    std::iter::once(ui::history::summary_line(&summary))
        .chain(
            ui::history::build_history_lines(messages, viewer, limit)
                .iter()
                .map(ToString::to_string),
        )
        .collect()
}
