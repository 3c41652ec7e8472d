//! Contexto de sessão explícito
//!
//! Substitui as flags globais do navegador (`isLoggedIn`, `rememberedUser`):
//! a sessão é criada no login, consultada pelos guards de rota e descartada
//! por inteiro no logout.

/// Sessão autenticada na API financeira
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
    username: Option<String>,
    remembered_user: Option<String>,
}

impl Session {
    /// Sessão anônima
    pub fn new() -> Self {
        Self::default()
    }

    /// Marca a sessão como autenticada
    ///
    /// `remember` guarda o usuário para pré-preencher o próximo login.
    pub fn start(&mut self, token: impl Into<String>, username: impl Into<String>, remember: bool) {
        let username = username.into();
        self.remembered_user = remember.then(|| username.clone());
        self.username = Some(username);
        self.token = Some(token.into());
    }

    /// Encerra a sessão (token, usuário e usuário lembrado)
    pub fn end(&mut self) {
        self.token = None;
        self.username = None;
        self.remembered_user = None;
    }

    /// Guard de rota
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Token para o header `Authorization: Bearer`
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn remembered_user(&self) -> Option<&str> {
        self.remembered_user.as_deref()
    }
}
