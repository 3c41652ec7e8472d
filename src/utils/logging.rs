use tracing::{debug, error, info, warn};

pub fn log_request_received(endpoint: &str, method: &str) {
    info!("Request received: {} {}", method, endpoint);
}

pub fn log_request_processed(endpoint: &str, status: u16, duration_ms: u64) {
    info!("Request processed: {} - Status: {} - Duration: {}ms",
          endpoint, status, duration_ms);
}

pub fn log_upstream_error(endpoint: &str, status: Option<u16>, error: &str) {
    error!("❌ Upstream error: {} - Status: {:?} - Error: {}", endpoint, status, error);
}

pub fn log_config_loaded(env: &str) {
    info!("Configuration loaded successfully for environment: {}", env);
}

pub fn log_server_startup(port: u16) {
    info!("🚀 Contratos middleware server starting on port {}", port);
}

pub fn log_server_ready(host: &str, port: u16) {
    info!("✅ Server ready and listening on http://{}:{}", host, port);
}

pub fn log_health_check() {
    debug!("Health check requested");
}

pub fn log_integration_status_check() {
    debug!("Integration status check requested");
}

pub fn log_validation_error(field: &str, message: &str) {
    warn!("Validation error: {} - {}", field, message);
}

pub fn log_pairing_transition(from: &str, to: &str) {
    info!("📱 Pareamento: {} → {}", from, to);
}

pub fn log_webhook_registered(url: &str) {
    info!("🔗 Webhook registrado: {}", url);
}

pub fn log_info(message: &str) {
    info!("{}", message);
}

pub fn log_warning(message: &str) {
    warn!("{}", message);
}
