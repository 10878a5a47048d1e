//! # Módulo de Configuração da Renovação
//!
//! Define tudo que uma execução precisa saber antes de abrir a página:
//! URL alvo, valor a preencher, timeouts, pausas, estratégias de seletor
//! e frases usadas na classificação.
//!
//! ## Para todos entenderem:
//!
//! A página alvo não tem API estável. Por isso a configuração lista
//! **várias** formas de encontrar o campo e o botão, em ordem de
//! prioridade. Se o site mudar o layout, basta ajustar a lista no
//! arquivo JSON, sem recompilar.
//!
//! ## Valores padrão:
//!
//! | Campo              | Padrão  | Descrição                              |
//! |--------------------|---------|----------------------------------------|
//! | timeout_ms         | 30000   | Timeout por operação do driver         |
//! | load_settle_ms     | 3000    | Pausa após carregar a página           |
//! | fill_settle_ms     | 2000    | Pausa após preencher o campo           |
//! | action_settle_ms   | 5000    | Pausa após clicar no botão             |
//!
//! ## Variáveis de ambiente:
//!
//! - `RENEWER_URL`: Sobrescreve `target_url`
//! - `RENEWER_FILL_VALUE`: Sobrescreve `fill_value`
//! - `RENEWER_TIMEOUT_MS`: Sobrescreve `timeout_ms`
//! - `RENEWER_SCREENSHOT_DIR`: Sobrescreve `screenshot_dir`
//! - `CHROME_BIN`: Caminho do executável do Chrome/Chromium

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::classifier::{OutcomeClassifier, PhraseSet};
use crate::context::Context;
use crate::driver::SelectorStrategy;
use crate::renewal::settle::SettlePolicy;

// ============================================================================
// VALORES PADRÃO (CONSTANTES)
// ============================================================================

pub const DEFAULT_TARGET_URL: &str = "https://freexcraft.com/external-renew";

/// Timeout por operação do driver (30 segundos).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_LOAD_SETTLE_MS: u64 = 3_000;
pub const DEFAULT_FILL_SETTLE_MS: u64 = 2_000;
pub const DEFAULT_ACTION_SETTLE_MS: u64 = 5_000;

const DEFAULT_INPUT_SELECTORS: &[&str] = &[
    r#"input[type="text"]"#,
    "input.input",
    r#"input[placeholder*="subdomain"]"#,
    r#"input[placeholder*="myserver"]"#,
    "input",
    "#subdomain",
    r#"[name="subdomain"]"#,
];

const DEFAULT_ACTION_SELECTORS: &[&str] = &[
    r#"button:has-text("Renew & Start")"#,
    r#"button:has-text("Renew")"#,
    r#"button:has-text("Start")"#,
    r#"button[type="submit"]"#,
    "button.btn",
    r#".btn:has-text("Renew")"#,
    "button",
];

const DEFAULT_ACTION_KEYWORDS: &[&str] = &["renew", "start"];

const DEFAULT_COOLDOWN_PHRASES: &[&str] = &["cooldown", "try again in", "wait"];

const DEFAULT_SUCCESS_PHRASES: &[&str] = &[
    "Server renewed",
    "already running",
    "renewed, but the server is already running",
    "extended",
    "started",
    "renewed successfully",
];

// ============================================================================
// ESTRUTURAS
// ============================================================================

/// Opções de inicialização do navegador.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    /// Argumentos extras repassados ao processo do navegador.
    pub extra_args: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            window_width: 1280,
            window_height: 720,
            extra_args: Vec::new(),
        }
    }
}

/// Política de recuperação da execução inteira.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Estratégia: "retry" ou "fail_fast"
    pub strategy: String,
    /// Número máximo de tentativas (incluindo a primeira)
    pub max_attempts: u32,
    /// Delay base em milissegundos entre tentativas
    pub backoff_ms: u64,
    /// Fator multiplicador para backoff exponencial (padrão: 2.0)
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            strategy: "fail_fast".to_string(),
            max_attempts: 1,
            backoff_ms: 0,
            backoff_factor: default_backoff_factor(),
        }
    }
}

/// Configuração completa de uma execução.
///
/// Todos os campos têm padrão, exceto `fill_value`, que a validação
/// exige não vazio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalConfig {
    pub target_url: String,
    pub fill_value: String,
    pub timeout_ms: u64,
    pub load_settle_ms: u64,
    pub fill_settle_ms: u64,
    pub action_settle_ms: u64,
    pub settle: SettlePolicy,
    pub input_selectors: Vec<SelectorStrategy>,
    pub action_selectors: Vec<SelectorStrategy>,
    pub action_keywords: Vec<String>,
    pub cooldown_phrases: Vec<String>,
    pub success_phrases: Vec<String>,
    /// Diretório para as capturas de tela de diagnóstico.
    pub screenshot_dir: Option<PathBuf>,
    pub browser: BrowserOptions,
    pub recovery: RecoveryPolicy,
    /// Variáveis disponíveis para interpolação `${nome}`.
    pub variables: HashMap<String, Value>,
}

fn strategies(list: &[&str]) -> Vec<SelectorStrategy> {
    list.iter().filter_map(|s| s.parse().ok()).collect()
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            fill_value: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            load_settle_ms: DEFAULT_LOAD_SETTLE_MS,
            fill_settle_ms: DEFAULT_FILL_SETTLE_MS,
            action_settle_ms: DEFAULT_ACTION_SETTLE_MS,
            settle: SettlePolicy::Fixed,
            input_selectors: strategies(DEFAULT_INPUT_SELECTORS),
            action_selectors: strategies(DEFAULT_ACTION_SELECTORS),
            action_keywords: strings(DEFAULT_ACTION_KEYWORDS),
            cooldown_phrases: strings(DEFAULT_COOLDOWN_PHRASES),
            success_phrases: strings(DEFAULT_SUCCESS_PHRASES),
            screenshot_dir: None,
            browser: BrowserOptions::default(),
            recovery: RecoveryPolicy::default(),
            variables: HashMap::new(),
        }
    }
}

impl RenewalConfig {
    /// Sobrescreve campos a partir de variáveis de ambiente.
    ///
    /// Valores que não fazem parse são ignorados (mantém o atual).
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("RENEWER_URL") {
            self.target_url = url;
        }

        if let Ok(value) = std::env::var("RENEWER_FILL_VALUE") {
            self.fill_value = value;
        }

        if let Ok(val) = std::env::var("RENEWER_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.timeout_ms = n;
            }
        }

        if let Ok(dir) = std::env::var("RENEWER_SCREENSHOT_DIR") {
            self.screenshot_dir = Some(PathBuf::from(dir));
        }

        if let Ok(bin) = std::env::var("CHROME_BIN") {
            self.browser.chrome_executable = Some(PathBuf::from(bin));
        }
    }

    /// Resolve placeholders `${...}` nos campos de texto livres.
    pub fn interpolate(&mut self) -> Result<()> {
        let mut context = Context::new();
        context.extend(&self.variables);

        self.target_url = context.interpolate_str(&self.target_url)?;
        self.fill_value = context.interpolate_str(&self.fill_value)?;
        if let Some(dir) = &self.screenshot_dir {
            let resolved = context.interpolate_str(&dir.to_string_lossy())?;
            self.screenshot_dir = Some(PathBuf::from(resolved));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn action_keywords(&self) -> PhraseSet {
        PhraseSet::new(&self.action_keywords)
    }

    pub fn classifier(&self) -> OutcomeClassifier {
        OutcomeClassifier::new(
            PhraseSet::new(&self.cooldown_phrases),
            PhraseSet::new(&self.success_phrases),
        )
    }

    /// Configuração sem pausas e com timeout curto, para testes.
    #[cfg(test)]
    pub fn for_tests(fill_value: &str) -> Self {
        Self {
            target_url: "https://renew.example.test/".to_string(),
            fill_value: fill_value.to_string(),
            timeout_ms: 200,
            load_settle_ms: 0,
            fill_settle_ms: 0,
            action_settle_ms: 0,
            ..Default::default()
        }
    }
}

// ============================================================================
// TESTES
// ============================================================================
