//! Máquina de estados do pareamento do WhatsApp
//!
//! ```text
//! Idle ──gerar──▶ Generating ──QR──▶ AwaitingScan ──Ready──▶ Verifying ──▶ Connected
//!   ▲                 │                   │                                   ▲
//!   └──── erro ───────┘            expirou (probe final)                      │
//!   └──────────────────────── sessão já pareada ──────────────────────────────┘
//! ```
//!
//! Uma única task dirige tudo: comandos chegam por `mpsc`, o estado sai por
//! `watch` e os temporizadores (contagem regressiva, polling do health, probe
//! final e verificação estendida) pertencem ao loop.
//!
//! O loop nunca espera HTTP. Cada chamada ao middleware ou ao gateway roda
//! numa task própria e o resultado volta pelo canal interno; um gateway lento
//! não atrasa a contagem nem os comandos seguintes. Cada reinício do fluxo
//! (novo QR, expiração, leitura confirmada) incrementa `epoch`, e resultados
//! de uma época anterior são descartados.

use crate::config::PairingSettings;
use crate::models::{Notification, NotificationLevel, PairingSnapshot, PairingState};
use crate::services::pairing_backend::PairingBackend;
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging::*;
use crate::utils::truncate_safe;
use quepasa::{
    HealthResponse, QrCode, QuepasaError, SendMessageRequest, SendMessageResponse, SessionProbe,
    UpstreamResponse,
};
use serde_json::Value;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

/// Períodos usados pelo pareamento
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingTiming {
    pub qr_lifetime_seconds: u64,
    pub poll_interval: Duration,
    pub extended_checks: u32,
    pub final_probe_delay: Duration,
}

impl From<&PairingSettings> for PairingTiming {
    fn from(settings: &PairingSettings) -> Self {
        Self {
            qr_lifetime_seconds: settings.qr_lifetime_seconds,
            poll_interval: Duration::from_secs(settings.poll_interval_seconds.max(1)),
            extended_checks: settings.extended_checks,
            final_probe_delay: Duration::from_millis(settings.final_probe_delay_ms),
        }
    }
}

impl Default for PairingTiming {
    fn default() -> Self {
        Self::from(&PairingSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingCommand {
    /// Verificação inicial da sessão (ao subir o servidor)
    Probe,
    GenerateCode,
    CheckConnection,
    ConfigureWebhook,
    SendMessage { phone: String, text: String },
}

type Reply = Option<oneshot::Sender<PairingSnapshot>>;

struct Envelope {
    command: PairingCommand,
    reply: Reply,
}

/// Qual temporizador pediu o health
#[derive(Debug, Clone, Copy)]
enum HealthCheck {
    Scan,
    Final,
    Extended,
}

/// Sessão existente, consultada fora do loop
///
/// Quando a sessão já está pareada e o webhook configurado não consta na
/// lista, o registro já foi tentado e o resultado vem em `webhook`.
struct Adoption {
    probe: quepasa::Result<SessionProbe>,
    webhook: Option<quepasa::Result<Value>>,
}

impl Adoption {
    async fn collect(backend: &dyn PairingBackend) -> Self {
        let probe = backend.probe_session().await;
        let webhook = match &probe {
            Ok(probe) if probe.verified && !probe.has_webhook(backend.webhook_url()) => {
                info!("⚠️ Webhook não configurado, configurando...");
                Some(backend.register_webhook().await)
            }
            _ => None,
        };
        Self { probe, webhook }
    }

    fn is_paired(&self) -> bool {
        matches!(&self.probe, Ok(probe) if probe.verified)
    }
}

/// Resultado de um comando cuja parte HTTP terminou
enum Outcome {
    Probed(Adoption),
    Generated {
        adoption: Adoption,
        qr: Option<quepasa::Result<UpstreamResponse>>,
    },
    Checked(quepasa::Result<HealthResponse>),
    WebhookConfigured(quepasa::Result<Value>),
    Sent(quepasa::Result<SendMessageResponse>),
}

enum Internal {
    Health {
        check: HealthCheck,
        epoch: u64,
        result: quepasa::Result<HealthResponse>,
    },
    WebhookRegistered {
        epoch: u64,
        result: quepasa::Result<Value>,
    },
    Completed {
        epoch: u64,
        outcome: Outcome,
        reply: Reply,
    },
}

/// Acesso à máquina de pareamento
///
/// Clonável; quando o último handle é descartado o loop termina e seus
/// temporizadores são cancelados.
#[derive(Clone)]
pub struct PairingHandle {
    commands: mpsc::Sender<Envelope>,
    state: watch::Receiver<PairingSnapshot>,
}

impl PairingHandle {
    /// Inicia o loop da máquina na runtime atual
    pub fn spawn(backend: Arc<dyn PairingBackend>, timing: PairingTiming) -> Self {
        let (commands, command_rx) = mpsc::channel(32);
        let (state_tx, state) = watch::channel(PairingSnapshot::default());

        let machine = PairingMachine::new(backend, timing, state_tx);
        tokio::spawn(machine.run(command_rx));

        Self { commands, state }
    }

    /// Enfileira um comando sem esperar o processamento
    pub async fn send(&self, command: PairingCommand) -> AppResult<()> {
        self.commands
            .send(Envelope { command, reply: None })
            .await
            .map_err(|_| closed())
    }

    /// Executa um comando e devolve o estado logo após o processamento
    pub async fn execute(&self, command: PairingCommand) -> AppResult<PairingSnapshot> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Envelope {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| closed())?;

        response.await.map_err(|_| closed())
    }

    pub fn snapshot(&self) -> PairingSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PairingSnapshot> {
        self.state.clone()
    }
}

fn closed() -> AppError {
    AppError::InternalError("Máquina de pareamento encerrada".to_string())
}

#[derive(Default)]
struct Timers {
    countdown: Option<Interval>,
    poll: Option<Interval>,
    extended: Option<Interval>,
    final_probe: Option<Pin<Box<Sleep>>>,
}

impl Timers {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Intervalo cujo primeiro tick acontece um período depois de criado
fn every(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn fire(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(deadline) => deadline.as_mut().await,
        None => pending::<()>().await,
    }
}

struct PairingMachine {
    backend: Arc<dyn PairingBackend>,
    timing: PairingTiming,
    snapshot: PairingSnapshot,
    state_tx: watch::Sender<PairingSnapshot>,
    timers: Timers,
    epoch: u64,
    // Um health de temporizador por vez; ticks no meio da chamada são pulados
    health_in_flight: bool,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,
}

impl PairingMachine {
    fn new(
        backend: Arc<dyn PairingBackend>,
        timing: PairingTiming,
        state_tx: watch::Sender<PairingSnapshot>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::channel(8);
        Self {
            backend,
            timing,
            snapshot: PairingSnapshot::default(),
            state_tx,
            timers: Timers::default(),
            epoch: 0,
            health_in_flight: false,
            internal_tx,
            internal_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Envelope>) {
        info!("📱 Máquina de pareamento iniciada");

        loop {
            let reply = tokio::select! {
                envelope = commands.recv() => {
                    let Some(Envelope { command, reply }) = envelope else {
                        break;
                    };
                    self.dispatch(command, reply)
                }
                _ = tick(&mut self.timers.countdown) => {
                    self.on_countdown_tick();
                    None
                }
                _ = tick(&mut self.timers.poll) => {
                    self.on_scan_poll();
                    None
                }
                _ = fire(&mut self.timers.final_probe) => {
                    self.on_final_probe();
                    None
                }
                _ = tick(&mut self.timers.extended) => {
                    self.on_extended_check();
                    None
                }
                Some(internal) = self.internal_rx.recv() => {
                    self.on_internal(internal)
                }
            };

            self.publish();
            if let Some(reply) = reply {
                let _ = reply.send(self.snapshot.clone());
            }
        }

        info!("📱 Máquina de pareamento encerrada");
    }

    /// Aplica a parte síncrona do comando e dispara a parte HTTP
    ///
    /// Devolve a resposta quando o comando já terminou aqui (validação).
    fn dispatch(&mut self, command: PairingCommand, reply: Reply) -> Reply {
        debug!("Comando de pareamento: {:?}", command);
        let backend = Arc::clone(&self.backend);

        match command {
            PairingCommand::Probe => {
                self.spawn_command(reply, async move {
                    Outcome::Probed(Adoption::collect(backend.as_ref()).await)
                });
            }
            PairingCommand::GenerateCode => {
                self.stop_timers();
                self.snapshot.last_error = None;
                self.snapshot.status_message = None;
                self.transition(PairingState::Generating);

                self.spawn_command(reply, async move {
                    let adoption = Adoption::collect(backend.as_ref()).await;
                    let qr = if adoption.is_paired() {
                        None
                    } else {
                        info!("🔍 Solicitando QR Code ao middleware...");
                        Some(backend.request_qr_code().await)
                    };
                    Outcome::Generated { adoption, qr }
                });
            }
            PairingCommand::CheckConnection => {
                self.set_status("🔍 Verificando conexão...");
                self.spawn_command(reply, async move {
                    Outcome::Checked(backend.health().await)
                });
            }
            PairingCommand::ConfigureWebhook => {
                info!("🔗 Configurando webhook...");
                self.spawn_command(reply, async move {
                    Outcome::WebhookConfigured(backend.register_webhook().await)
                });
            }
            PairingCommand::SendMessage { phone, text } => {
                if phone.trim().is_empty() {
                    log_validation_error("phone", "telefone vazio");
                    self.notify(NotificationLevel::Warning, "Atenção!", "Digite o número do telefone");
                    return reply;
                }
                if text.trim().is_empty() {
                    log_validation_error("text", "mensagem vazia");
                    self.notify(NotificationLevel::Warning, "Atenção!", "Digite a mensagem");
                    return reply;
                }

                let request = SendMessageRequest::for_phone(&phone, &text);
                info!("📤 Enviando mensagem para {}", request.chatid);
                self.spawn_command(reply, async move {
                    Outcome::Sent(backend.send_message(&request).await)
                });
            }
        }

        None
    }

    fn spawn_io<F>(&self, work: F)
    where
        F: Future<Output = Internal> + Send + 'static,
    {
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let _ = internal_tx.send(work.await).await;
        });
    }

    fn spawn_command<F>(&self, reply: Reply, work: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let epoch = self.epoch;
        self.spawn_io(async move {
            Internal::Completed {
                epoch,
                outcome: work.await,
                reply,
            }
        });
    }

    fn spawn_health(&mut self, check: HealthCheck) {
        self.health_in_flight = true;
        let epoch = self.epoch;
        let backend = Arc::clone(&self.backend);
        self.spawn_io(async move {
            Internal::Health {
                check,
                epoch,
                result: backend.health().await,
            }
        });
    }

    fn on_internal(&mut self, internal: Internal) -> Reply {
        match internal {
            Internal::Health {
                check,
                epoch,
                result,
            } => {
                if epoch != self.epoch {
                    debug!("Health {:?} de um fluxo anterior descartado", check);
                    return None;
                }
                self.health_in_flight = false;
                match check {
                    HealthCheck::Scan => self.on_scan_result(result),
                    HealthCheck::Final => self.on_final_result(result),
                    HealthCheck::Extended => self.on_extended_result(result),
                }
                None
            }
            Internal::WebhookRegistered { epoch, result } => {
                let current = matches!(
                    self.snapshot.state,
                    PairingState::Verifying { .. } | PairingState::Connected
                );
                if epoch == self.epoch && current {
                    self.report_webhook(result);
                } else {
                    debug!("Registro de webhook de um pareamento anterior ignorado");
                }
                None
            }
            Internal::Completed {
                epoch,
                outcome,
                reply,
            } => {
                self.complete(epoch, outcome);
                reply
            }
        }
    }

    fn complete(&mut self, epoch: u64, outcome: Outcome) {
        match outcome {
            Outcome::Probed(adoption) => {
                if epoch != self.epoch {
                    debug!("Verificação inicial superada por outro comando");
                    return;
                }
                if !self.adopt(adoption) && self.snapshot.state.is_connected() {
                    self.transition(PairingState::Idle);
                }
            }
            Outcome::Generated { adoption, qr } => {
                if epoch != self.epoch {
                    debug!("QR Code de uma geração anterior descartado");
                    return;
                }
                self.on_generated(adoption, qr);
            }
            Outcome::Checked(result) => self.check_connection(result),
            Outcome::WebhookConfigured(result) => {
                if self.report_webhook(result) {
                    self.stop_timers();
                    self.transition(PairingState::Connected);
                }
            }
            Outcome::Sent(result) => self.report_sent(result),
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot.clone());
    }

    fn transition(&mut self, next: PairingState) {
        let from = self.snapshot.state.name();
        if from != next.name() {
            log_pairing_transition(from, next.name());
        }
        self.snapshot.state = next;
    }

    /// Cancela os temporizadores e invalida resultados ainda em voo
    fn stop_timers(&mut self) {
        self.timers.clear();
        self.epoch = self.epoch.wrapping_add(1);
        self.health_in_flight = false;
    }

    fn notify(&mut self, level: NotificationLevel, title: &str, text: impl Into<String>) {
        self.snapshot.notify(Notification::new(level, title, text));
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.snapshot.status_message = Some(message.into());
    }

    /// Sessão pareada anteriormente vira `Connected` sem QR Code
    fn adopt(&mut self, adoption: Adoption) -> bool {
        let probe = match adoption.probe {
            Ok(probe) => probe,
            Err(e) => {
                warn!("⚠️ Falha ao verificar sessão existente: {}", e);
                return false;
            }
        };

        if !probe.verified {
            debug!("Sessão não pareada");
            return false;
        }

        info!(
            "✅ WhatsApp já está conectado (wid: {:?}, user: {:?})",
            probe.wid, probe.user
        );

        match adoption.webhook {
            None => {
                debug!("Webhook já está configurado");
                self.set_status("✅ WhatsApp conectado e webhook configurado!");
            }
            Some(result) => {
                self.set_status("✅ WhatsApp conectado! Configurando webhook...");
                self.report_webhook(result);
            }
        }

        self.stop_timers();
        self.transition(PairingState::Connected);
        true
    }

    fn on_generated(&mut self, adoption: Adoption, qr: Option<quepasa::Result<UpstreamResponse>>) {
        if self.adopt(adoption) {
            return;
        }

        let response = match qr {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                log_upstream_error("/conecta", None, &e.to_string());
                self.fail(
                    "Erro de Conexão",
                    format!("Erro: {}", e),
                    format!("❌ Erro de conexão: {}", e),
                );
                return;
            }
            None => {
                self.transition(PairingState::Idle);
                return;
            }
        };

        if !response.is_success() {
            let body = response.text();
            log_upstream_error("/conecta", Some(response.status), truncate_safe(&body, 200));
            let detail = format!("{} - {}", response.status, body);
            self.fail(
                "Erro na API",
                format!("Erro: {}", detail),
                format!("❌ Erro na API: {}", detail),
            );
            return;
        }

        match QrCode::classify(&response) {
            Ok(qr) => {
                info!("📷 QR Code recebido ({:?})", response.kind());
                self.start_scan(qr);
            }
            Err(e) => {
                let message = match e {
                    QuepasaError::UnexpectedResponse(message) => message,
                    other => other.to_string(),
                };
                warn!("⚠️ {}", message);
                self.snapshot.last_error = Some(format!("⚠️ {}", message));
                self.transition(PairingState::Idle);
            }
        }
    }

    fn fail(&mut self, title: &str, text: String, last_error: String) {
        self.snapshot.last_error = Some(last_error);
        self.notify(NotificationLevel::Error, title, text);
        self.transition(PairingState::Idle);
    }

    fn start_scan(&mut self, qr: QrCode) {
        let seconds_left = self.timing.qr_lifetime_seconds;
        self.transition(PairingState::AwaitingScan { qr, seconds_left });
        self.timers.countdown = Some(every(Duration::from_secs(1)));
        self.timers.poll = Some(every(self.timing.poll_interval));
    }

    fn on_countdown_tick(&mut self) {
        let remaining = match &mut self.snapshot.state {
            PairingState::AwaitingScan { seconds_left, .. } => {
                *seconds_left = seconds_left.saturating_sub(1);
                *seconds_left
            }
            _ => {
                self.timers.countdown = None;
                return;
            }
        };

        if remaining > 0 {
            return;
        }

        info!(
            "⏰ QR Code expirou, verificação final em {:?}",
            self.timing.final_probe_delay
        );
        self.stop_timers();
        self.transition(PairingState::Idle);
        self.timers.final_probe = Some(Box::pin(sleep(self.timing.final_probe_delay)));
    }

    fn on_scan_poll(&mut self) {
        if self.health_in_flight {
            debug!("Verificação anterior ainda em andamento, tick ignorado");
            return;
        }
        self.spawn_health(HealthCheck::Scan);
    }

    /// Falhas durante a contagem são silenciosas: o usuário ainda pode ler o QR
    fn on_scan_result(&mut self, result: quepasa::Result<HealthResponse>) {
        if !matches!(self.snapshot.state, PairingState::AwaitingScan { .. }) {
            return;
        }
        match result {
            Ok(health) if health.is_ready() => self.on_ready(),
            Ok(health) => debug!("Sessão ainda não pronta: {:?}", health.first_status()),
            Err(e) => debug!("Verificação durante o QR falhou: {}", e),
        }
    }

    fn on_final_probe(&mut self) {
        self.timers.final_probe = None;
        self.spawn_health(HealthCheck::Final);
    }

    fn on_final_result(&mut self, result: quepasa::Result<HealthResponse>) {
        if self.snapshot.state != PairingState::Idle {
            return;
        }
        match result {
            Ok(health) if health.is_ready() => self.on_ready(),
            Ok(health) => {
                debug!("Verificação final: sessão não pronta ({:?})", health.first_status());
            }
            Err(QuepasaError::ApiError { status, .. }) => {
                self.set_status(format!("❌ Erro na verificação: {}", status));
            }
            Err(e) => {
                self.set_status(format!("❌ Erro de conexão: {}", e));
            }
        }
    }

    fn on_ready(&mut self) {
        info!("✅ WhatsApp conectou, configurando webhook...");
        self.stop_timers();
        self.spawn_webhook_registration();

        if self.timing.extended_checks == 0 {
            self.set_status("✅ WhatsApp conectado!");
            self.transition(PairingState::Connected);
            return;
        }

        self.set_status("🔍 Verificando conexão...");
        self.transition(PairingState::Verifying { attempt: 0 });
        self.timers.extended = Some(every(self.timing.poll_interval));
    }

    fn spawn_webhook_registration(&self) {
        let epoch = self.epoch;
        let backend = Arc::clone(&self.backend);
        self.spawn_io(async move {
            Internal::WebhookRegistered {
                epoch,
                result: backend.register_webhook().await,
            }
        });
    }

    fn on_extended_check(&mut self) {
        let attempt = match self.snapshot.state {
            PairingState::Verifying { attempt } => attempt + 1,
            _ => {
                self.timers.extended = None;
                return;
            }
        };
        if self.health_in_flight {
            debug!("Verificação estendida anterior ainda em andamento");
            return;
        }

        self.transition(PairingState::Verifying { attempt });
        debug!(
            "🔍 Verificação estendida {}/{}",
            attempt, self.timing.extended_checks
        );
        self.spawn_health(HealthCheck::Extended);
    }

    /// Confirmação após a leitura do QR; termina em `Connected` de qualquer forma
    fn on_extended_result(&mut self, result: quepasa::Result<HealthResponse>) {
        let PairingState::Verifying { attempt } = self.snapshot.state else {
            return;
        };

        let ready = match result {
            Ok(health) => health.is_ready(),
            Err(e) => {
                debug!("❌ Erro na verificação estendida: {}", e);
                false
            }
        };

        if ready || attempt >= self.timing.extended_checks {
            self.timers.extended = None;
            self.set_status("✅ WhatsApp conectado!");
            self.transition(PairingState::Connected);
        }
    }

    fn check_connection(&mut self, result: quepasa::Result<HealthResponse>) {
        match result {
            Ok(health) if health.is_ready() => {
                info!("✅ WhatsApp conectado e funcionando!");
                self.set_status("✅ WhatsApp conectado e funcionando!");
                self.notify(
                    NotificationLevel::Success,
                    "Conectado!",
                    "WhatsApp está conectado e funcionando",
                );
                self.timers.clear();
                self.transition(PairingState::Connected);
            }
            Ok(health) => {
                let text = match health.first_status() {
                    Some(status) => format!("WhatsApp não está pronto: {}", status),
                    None => "Nenhum item encontrado na API".to_string(),
                };
                warn!("⚠️ {}", text);
                self.set_status(format!("⚠️ {}", text));
                self.notify(NotificationLevel::Warning, "Não Conectado", text);
                self.drop_connection();
            }
            Err(QuepasaError::ApiError { status, message }) => {
                log_upstream_error("/health", Some(status), &message);
                self.set_status(format!("❌ Erro na verificação: {}", status));
                self.notify(
                    NotificationLevel::Error,
                    "Erro na Verificação",
                    format!("Erro HTTP: {}", status),
                );
                self.drop_connection();
            }
            Err(e) => {
                log_upstream_error("/health", None, &e.to_string());
                self.set_status(format!("❌ Erro de conexão: {}", e));
                self.notify(NotificationLevel::Error, "Erro de Conexão", format!("Erro: {}", e));
                self.drop_connection();
            }
        }
    }

    fn drop_connection(&mut self) {
        if self.snapshot.state.is_connected() {
            self.transition(PairingState::Idle);
        }
    }

    /// Notifica o resultado de um registro de webhook
    ///
    /// Devolve `true` quando o gateway respondeu (com sucesso ou não).
    fn report_webhook(&mut self, result: quepasa::Result<Value>) -> bool {
        match result {
            Ok(body) => {
                log_webhook_registered(self.backend.webhook_url());
                debug!("Resposta do webhook: {}", body);
                self.set_status("✅ WhatsApp conectado e webhook configurado!");
                self.notify(
                    NotificationLevel::Success,
                    "Webhook Configurado!",
                    "Webhook configurado com sucesso!",
                );
                true
            }
            Err(QuepasaError::ApiError { status, message }) => {
                log_upstream_error("/webhook", Some(status), &message);
                self.set_status("✅ WhatsApp conectado, mas falha ao configurar webhook");
                self.notify(
                    NotificationLevel::Error,
                    "Erro no Webhook",
                    format!("Falha ao configurar webhook: {} - {}", status, message),
                );
                true
            }
            Err(e) => {
                log_upstream_error("/webhook", None, &e.to_string());
                self.set_status("✅ WhatsApp conectado, mas erro ao configurar webhook");
                self.notify(
                    NotificationLevel::Error,
                    "Erro de Conexão",
                    format!("Erro ao configurar webhook: {}", e),
                );
                false
            }
        }
    }

    fn report_sent(&mut self, result: quepasa::Result<SendMessageResponse>) {
        match result {
            Ok(response) if response.success => {
                info!("✅ Mensagem enviada com sucesso");
                self.notify(NotificationLevel::Success, "Sucesso!", "Mensagem enviada com sucesso!");
            }
            Ok(response) => {
                let text = response
                    .message
                    .unwrap_or_else(|| "Falha ao enviar mensagem".to_string());
                warn!("❌ Falha no envio: {}", text);
                self.notify(NotificationLevel::Error, "Erro!", text);
            }
            Err(QuepasaError::ApiError { status, message }) => {
                log_upstream_error("/enviarmsg", Some(status), &message);
                self.notify(NotificationLevel::Error, "Erro!", message);
            }
            Err(e) => {
                log_upstream_error("/enviarmsg", None, &e.to_string());
                self.notify(NotificationLevel::Error, "Erro de Conexão", format!("Erro: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const HOOK: &str = "http://financeiro.vstec.net/webhooks/webhook";

    /// Backend roteirizado: `ready` decide, pela ordem da chamada (1-based),
    /// se o health responde "Ready"
    struct ScriptedBackend {
        verified: bool,
        webhooks: Vec<String>,
        qr: UpstreamResponse,
        ready: fn(usize) -> bool,
        webhook_fails: bool,
        health_delay: Duration,
        webhook_delay: Duration,
        health_calls: AtomicUsize,
        webhook_calls: AtomicUsize,
        qr_calls: AtomicUsize,
        sent: Mutex<Vec<SendMessageRequest>>,
    }

    impl Default for ScriptedBackend {
        fn default() -> Self {
            Self {
                verified: false,
                webhooks: Vec::new(),
                qr: upstream(200, "application/json", br#"{"qrcode": "2@abc"}"#),
                ready: |_| false,
                webhook_fails: false,
                health_delay: Duration::ZERO,
                webhook_delay: Duration::ZERO,
                health_calls: AtomicUsize::new(0),
                webhook_calls: AtomicUsize::new(0),
                qr_calls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    fn upstream(status: u16, content_type: &str, body: &[u8]) -> UpstreamResponse {
        UpstreamResponse {
            status,
            status_text: String::new(),
            content_type: Some(content_type.to_string()),
            body: body.to_vec(),
        }
    }

    #[async_trait]
    impl PairingBackend for ScriptedBackend {
        async fn probe_session(&self) -> quepasa::Result<SessionProbe> {
            Ok(SessionProbe {
                verified: self.verified,
                webhooks: self.webhooks.clone(),
                ..Default::default()
            })
        }

        async fn request_qr_code(&self) -> quepasa::Result<UpstreamResponse> {
            self.qr_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.qr.clone())
        }

        async fn health(&self) -> quepasa::Result<HealthResponse> {
            let call = self.health_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.health_delay.is_zero() {
                tokio::time::sleep(self.health_delay).await;
            }
            let status = if (self.ready)(call) { "Ready" } else { "Starting" };
            Ok(serde_json::from_value(json!({"success": true, "items": [{"status": status}]}))?)
        }

        async fn register_webhook(&self) -> quepasa::Result<Value> {
            self.webhook_calls.fetch_add(1, Ordering::SeqCst);
            if !self.webhook_delay.is_zero() {
                tokio::time::sleep(self.webhook_delay).await;
            }
            if self.webhook_fails {
                return Err(QuepasaError::ConfigError("bot id não configurado".to_string()));
            }
            Ok(json!({"success": true}))
        }

        async fn send_message(
            &self,
            request: &SendMessageRequest,
        ) -> quepasa::Result<SendMessageResponse> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(SendMessageResponse {
                success: true,
                message: None,
            })
        }

        fn webhook_url(&self) -> &str {
            HOOK
        }
    }

    fn start(backend: ScriptedBackend) -> (PairingHandle, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let handle = PairingHandle::spawn(backend.clone(), PairingTiming::default());
        (handle, backend)
    }

    fn health_calls(backend: &ScriptedBackend) -> usize {
        backend.health_calls.load(Ordering::SeqCst)
    }

    fn webhook_calls(backend: &ScriptedBackend) -> usize {
        backend.webhook_calls.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn test_qr_expires_with_single_final_probe() {
        let (handle, backend) = start(ScriptedBackend::default());

        let snapshot = handle.execute(PairingCommand::GenerateCode).await.unwrap();
        assert_eq!(
            snapshot.state,
            PairingState::AwaitingScan {
                qr: QrCode::Code("2@abc".to_string()),
                seconds_left: 20
            }
        );

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        match handle.snapshot().state {
            PairingState::AwaitingScan { seconds_left, .. } => assert_eq!(seconds_left, 10),
            other => panic!("estado inesperado: {:?}", other),
        }

        tokio::time::sleep(Duration::from_secs(20)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, PairingState::Idle);
        assert!(snapshot.state.qr_code().is_none());
        // 6 polls (3s..18s) + 1 probe final (21s)
        assert_eq!(health_calls(&backend), 7);
        assert_eq!(webhook_calls(&backend), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(health_calls(&backend), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_during_scan_registers_webhook_once() {
        let (handle, backend) = start(ScriptedBackend {
            ready: |call| call == 2,
            ..Default::default()
        });

        handle.execute(PairingCommand::GenerateCode).await.unwrap();

        // Segundo poll (6s) responde Ready
        tokio::time::sleep(Duration::from_secs(7)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, PairingState::Verifying { attempt: 0 });
        assert_eq!(health_calls(&backend), 2);
        assert_eq!(webhook_calls(&backend), 1);
        assert_eq!(snapshot.last_notification().unwrap().title, "Webhook Configurado!");

        tokio::time::sleep(Duration::from_secs(30)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, PairingState::Connected);
        // Ready no poll 2 + 3 verificações estendidas sem Ready
        assert_eq!(health_calls(&backend), 5);
        assert_eq!(webhook_calls(&backend), 1);
        assert_eq!(snapshot.status_message.as_deref(), Some("✅ WhatsApp conectado!"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extended_check_confirms_early() {
        let (handle, backend) = start(ScriptedBackend {
            ready: |call| call >= 1,
            ..Default::default()
        });

        handle.execute(PairingCommand::GenerateCode).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(handle.snapshot().state, PairingState::Connected);
        assert_eq!(health_calls(&backend), 2);
        assert_eq!(webhook_calls(&backend), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_probe_ready_enters_verification() {
        // Polls 1..=6 sem Ready, probe final (7) pronto
        let (handle, backend) = start(ScriptedBackend {
            ready: |call| call == 7,
            ..Default::default()
        });

        handle.execute(PairingCommand::GenerateCode).await.unwrap();
        tokio::time::sleep(Duration::from_millis(21_500)).await;
        assert_eq!(handle.snapshot().state, PairingState::Verifying { attempt: 0 });
        assert_eq!(webhook_calls(&backend), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.snapshot().state, PairingState::Connected);
        assert_eq!(health_calls(&backend), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_probe_with_webhook_present() {
        let (handle, backend) = start(ScriptedBackend {
            verified: true,
            webhooks: vec![HOOK.to_string()],
            ..Default::default()
        });

        let snapshot = handle.execute(PairingCommand::Probe).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Connected);
        assert_eq!(webhook_calls(&backend), 0);
        assert_eq!(
            snapshot.status_message.as_deref(),
            Some("✅ WhatsApp conectado e webhook configurado!")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_probe_registers_missing_webhook() {
        let (handle, backend) = start(ScriptedBackend {
            verified: true,
            webhooks: vec!["http://outro/webhook".to_string()],
            ..Default::default()
        });

        let snapshot = handle.execute(PairingCommand::Probe).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Connected);
        assert_eq!(webhook_calls(&backend), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_probe_not_verified_stays_idle() {
        let (handle, backend) = start(ScriptedBackend::default());

        let snapshot = handle.execute(PairingCommand::Probe).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Idle);
        assert_eq!(webhook_calls(&backend), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_skips_qr_when_already_paired() {
        let (handle, backend) = start(ScriptedBackend {
            verified: true,
            webhooks: vec![HOOK.to_string()],
            ..Default::default()
        });

        let snapshot = handle.execute(PairingCommand::GenerateCode).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Connected);
        assert_eq!(backend.qr_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_png_becomes_data_url() {
        let (handle, _backend) = start(ScriptedBackend {
            qr: upstream(200, "image/png", &[0x89, b'P', b'N', b'G']),
            ..Default::default()
        });

        let snapshot = handle.execute(PairingCommand::GenerateCode).await.unwrap();
        let qr = snapshot.state.qr_code().expect("QR exibido");
        assert!(matches!(qr, QrCode::DataUrl(_)));
        assert!(qr.as_str().starts_with("data:image/png;base64,"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_without_qr_code_is_an_error() {
        let (handle, _backend) = start(ScriptedBackend {
            qr: upstream(200, "application/json", br#"{"status": "ok"}"#),
            ..Default::default()
        });

        let snapshot = handle.execute(PairingCommand::GenerateCode).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Idle);
        assert!(snapshot.last_error.unwrap().contains("sem QR Code"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_reports_status_and_body() {
        let (handle, backend) = start(ScriptedBackend {
            qr: upstream(500, "text/plain", b"boom"),
            ..Default::default()
        });

        let snapshot = handle.execute(PairingCommand::GenerateCode).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Idle);
        assert_eq!(snapshot.last_error.as_deref(), Some("❌ Erro na API: 500 - boom"));
        let notification = snapshot.last_notification().unwrap();
        assert_eq!(notification.level, NotificationLevel::Error);
        assert_eq!(notification.text, "Erro: 500 - boom");

        // Sem QR não há polling
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(health_calls(&backend), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_check_connects_and_disconnects() {
        let (handle, _backend) = start(ScriptedBackend {
            ready: |call| call == 1,
            ..Default::default()
        });

        let snapshot = handle.execute(PairingCommand::CheckConnection).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Connected);
        assert_eq!(snapshot.last_notification().unwrap().level, NotificationLevel::Success);

        let snapshot = handle.execute(PairingCommand::CheckConnection).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Idle);
        let notification = snapshot.last_notification().unwrap();
        assert_eq!(notification.level, NotificationLevel::Warning);
        assert_eq!(notification.text, "WhatsApp não está pronto: Starting");
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_webhook_transport_failure_keeps_state() {
        let (handle, backend) = start(ScriptedBackend {
            webhook_fails: true,
            ..Default::default()
        });

        let snapshot = handle.execute(PairingCommand::ConfigureWebhook).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Idle);
        assert_eq!(webhook_calls(&backend), 1);
        assert_eq!(snapshot.last_notification().unwrap().level, NotificationLevel::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_webhook_marks_connected() {
        let (handle, _backend) = start(ScriptedBackend::default());

        let snapshot = handle.execute(PairingCommand::ConfigureWebhook).await.unwrap();
        assert_eq!(snapshot.state, PairingState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_message_requires_phone_and_text() {
        let (handle, backend) = start(ScriptedBackend::default());

        let snapshot = handle
            .execute(PairingCommand::SendMessage {
                phone: "  ".to_string(),
                text: "Olá".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(snapshot.last_notification().unwrap().text, "Digite o número do telefone");

        let snapshot = handle
            .execute(PairingCommand::SendMessage {
                phone: "11999990000".to_string(),
                text: "".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(snapshot.last_notification().unwrap().text, "Digite a mensagem");
        assert!(backend.sent.lock().unwrap().is_empty());

        let snapshot = handle
            .execute(PairingCommand::SendMessage {
                phone: " 11999990000 ".to_string(),
                text: " Olá ".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(snapshot.last_notification().unwrap().level, NotificationLevel::Success);

        let sent = backend.sent.lock().unwrap();
        assert_eq!(sent[0].chatid, "5511999990000@s.whatsapp.net");
        assert_eq!(sent[0].text, "Olá");
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_published_state() {
        let (handle, _backend) = start(ScriptedBackend::default());
        let mut updates = handle.subscribe();

        handle.send(PairingCommand::GenerateCode).await.unwrap();
        let snapshot = updates
            .wait_for(|snapshot| snapshot.state.name() == "awaiting_scan")
            .await
            .unwrap();
        assert!(snapshot.state.qr_code().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_gateway_does_not_stall_countdown() {
        let (handle, backend) = start(ScriptedBackend {
            health_delay: Duration::from_secs(5),
            ..Default::default()
        });

        handle.execute(PairingCommand::GenerateCode).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        match handle.snapshot().state {
            PairingState::AwaitingScan { seconds_left, .. } => assert_eq!(seconds_left, 10),
            other => panic!("estado inesperado: {:?}", other),
        }

        // A resposta espera só o próprio health, não os polls em andamento
        let started = Instant::now();
        let snapshot = handle.execute(PairingCommand::CheckConnection).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(snapshot.last_notification().unwrap().title, "Não Conectado");
        match snapshot.state {
            PairingState::AwaitingScan { seconds_left, .. } => assert_eq!(seconds_left, 5),
            other => panic!("estado inesperado: {:?}", other),
        }

        // O QR some aos 20s mesmo com polls de 5s
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, PairingState::Idle);
        assert!(snapshot.state.qr_code().is_none());

        // Polls não se sobrepõem: 3s, 9s e 15s + verificação manual
        assert_eq!(health_calls(&backend), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_webhook_result_is_ignored_after_new_code() {
        let (handle, backend) = start(ScriptedBackend {
            ready: |call| call == 1,
            webhook_delay: Duration::from_secs(5),
            ..Default::default()
        });

        handle.execute(PairingCommand::GenerateCode).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(handle.snapshot().state, PairingState::Verifying { attempt: 0 });

        // Novo QR antes do registro (iniciado aos 3s) terminar
        let snapshot = handle.execute(PairingCommand::GenerateCode).await.unwrap();
        assert!(matches!(snapshot.state, PairingState::AwaitingScan { .. }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = handle.snapshot();
        assert_eq!(webhook_calls(&backend), 1);
        assert!(matches!(snapshot.state, PairingState::AwaitingScan { .. }));
        assert_eq!(snapshot.status_message, None);
        assert!(snapshot
            .notifications
            .iter()
            .all(|n| n.title != "Webhook Configurado!"));
    }
}
