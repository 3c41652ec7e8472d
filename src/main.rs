/// Relay de contratos
///
/// - Relay CORS para o middleware de mensagens (`/api/whatsapp/*`)
/// - Máquina de pareamento do WhatsApp (`/api/whatsapp/pareamento/*`)
/// - Health checks (`/health`, `/ready`, `/status`)

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use contratos_middleware::{build_router, config::Settings, services::PairingCommand, AppState};
use contratos_middleware::utils::logging::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 🔧 Carregar variáveis de ambiente do arquivo .env (se existir)
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if dotenv_loaded {
        tracing::info!("✅ Arquivo .env carregado com sucesso");
    } else {
        tracing::debug!("Arquivo .env não encontrado - usando variáveis de ambiente do sistema");
    }

    let settings = Settings::new().context("Failed to load settings")?;
    log_config_loaded(&std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string()));

    if settings.middleware.token.is_none() {
        log_warning("⚠️ QUEPASA_TOKEN não configurado - chamadas ao middleware irão sem token");
    }

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let probe_on_startup = settings.pairing.probe_on_startup;

    let app_state = Arc::new(AppState::from_settings(settings)?);

    // Sessão na API financeira
    match app_state.login_financeiro().await {
        Ok(true) => log_info("✅ Sessão na API financeira iniciada"),
        Ok(false) => log_warning("⚠️ FINANCEIRO_USERNAME/FINANCEIRO_PASSWORD não configurados - sem sessão financeira"),
        Err(e) => log_warning(&format!("⚠️ Login na API financeira falhou: {}", e)),
    }

    // Verificação inicial da sessão do WhatsApp
    if probe_on_startup {
        app_state.pairing.send(PairingCommand::Probe).await?;
    }

    let app = build_router(app_state);

    log_server_startup(port);
    let listener = TcpListener::bind(format!("{}:{}", host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    log_server_ready(&host, port);

    // Graceful shutdown com signal handling
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_info("🛑 Server shut down gracefully");
    Ok(())
}

/// Signal handler para graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log_info("🛑 Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            log_info("🛑 Received SIGTERM, shutting down gracefully...");
        }
    }
}
