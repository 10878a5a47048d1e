//! Módulo de Retry com RecoveryPolicy.
//!
//! Repete a execução inteira (novo navegador, nova página) conforme a
//! política configurada:
//! - `fail_fast`: executa uma vez
//! - `retry`: tenta novamente até max_attempts com backoff exponencial,
//!   apenas enquanto o resultado permitir (ver `RunReport::is_retryable`)

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RecoveryPolicy;

/// Estratégias de recuperação suportadas.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    /// Retry com backoff exponencial
    Retry,
    /// Executa uma única vez
    FailFast,
}

impl RecoveryStrategy {
    /// `None` para estratégias desconhecidas (a validação rejeita).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "retry" => Some(Self::Retry),
            "fail_fast" | "failfast" => Some(Self::FailFast),
            _ => None,
        }
    }
}

/// Executor de retry com backoff exponencial.
pub struct RetryExecutor {
    policy: RecoveryPolicy,
    strategy: RecoveryStrategy,
}

impl RetryExecutor {
    pub fn new(policy: RecoveryPolicy) -> Self {
        // Default conservador
        let strategy = RecoveryStrategy::parse(&policy.strategy).unwrap_or(RecoveryStrategy::FailFast);
        Self { policy, strategy }
    }

    /// Executa uma operação, repetindo enquanto `should_retry` aceitar o
    /// resultado e houver tentativas.
    ///
    /// # Argumentos
    /// * `label` - Nome para logging
    /// * `operation` - Closure assíncrona que recebe o número da tentativa
    /// * `should_retry` - Decide se o resultado justifica nova tentativa
    ///
    /// # Retorno
    /// O resultado da última tentativa executada.
    pub async fn execute<T, F, Fut, P>(&self, label: &str, mut operation: F, should_retry: P) -> T
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = T>,
        P: Fn(&T) -> bool,
    {
        let max_attempts = match self.strategy {
            RecoveryStrategy::FailFast => 1,
            RecoveryStrategy::Retry => self.policy.max_attempts.max(1),
        };

        let mut attempt = 1;
        let mut current_backoff = self.policy.backoff_ms;

        loop {
            let result = operation(attempt).await;

            if !should_retry(&result) {
                if attempt > 1 {
                    info!(label = %label, attempt = attempt, "Retry concluído");
                }
                return result;
            }

            if attempt >= max_attempts {
                if max_attempts > 1 {
                    warn!(
                        label = %label,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        "Todas as tentativas esgotadas"
                    );
                }
                return result;
            }

            warn!(
                label = %label,
                attempt = attempt,
                max_attempts = max_attempts,
                backoff_ms = current_backoff,
                "Tentativa falhou, aguardando retry"
            );

            // Aguarda backoff
            sleep(Duration::from_millis(current_backoff)).await;

            // Calcula próximo backoff (exponencial)
            current_backoff = (current_backoff as f64 * self.policy.backoff_factor) as u64;
            attempt += 1;
        }
    }
}
