//! # Pausas de Acomodação (settle)
//!
//! Depois de carregar a página e depois de clicar no botão, a página
//! precisa de tempo para renderizar no cliente e para o servidor
//! refletir a mudança de estado no texto exibido.
//!
//! ## Modos suportados:
//! - `fixed` - Apenas aguarda o tempo configurado (padrão)
//! - `until_stable` - Aguarda o tempo configurado e depois lê o texto da
//!   página em intervalos até duas leituras seguidas serem idênticas,
//!   limitado por `max_ms`
//!
//! ## Exemplo de configuração:
//!
//! ```json
//! {
//!   "action_settle_ms": 5000,
//!   "settle": { "mode": "until_stable", "interval_ms": 500, "max_ms": 10000 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use crate::driver::{DriverError, PageDriver};

// ============================================================================
// POLÍTICA DE ACOMODAÇÃO
// ============================================================================

/// Como aguardar a página depois da ativação, antes da classificação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SettlePolicy {
    /// Apenas o atraso fixo.
    #[default]
    Fixed,

    /// Atraso fixo seguido de polling até o texto parar de mudar.
    UntilStable {
        /// Intervalo entre leituras, em milissegundos.
        interval_ms: u64,
        /// Tempo máximo de polling, em milissegundos.
        max_ms: u64,
    },
}

/// Pausa simples, sem consultar a página.
///
/// Retorna a duração real em milissegundos.
pub async fn pause(label: &str, delay: Duration) -> u64 {
    if delay.is_zero() {
        return 0;
    }

    let start = Instant::now();
    debug!(label = %label, delay_ms = delay.as_millis() as u64, "⏳ Aguardando...");

    // `sleep` do Tokio não bloqueia a thread.
    sleep(delay).await;

    start.elapsed().as_millis() as u64
}

/// Aplica a pausa pós-ativação conforme a política.
///
/// ## Retorno:
/// - `Ok(true)` se a página foi considerada estável (sempre `true` no modo fixo)
/// - `Ok(false)` se `max_ms` foi atingido com o texto ainda mudando
/// - `Err` se a leitura do texto falhou (timeout incluso)
#[instrument(skip(page), fields(delay_ms = delay.as_millis() as u64))]
pub async fn settle<D: PageDriver>(
    page: &D,
    delay: Duration,
    policy: &SettlePolicy,
) -> Result<bool, DriverError> {
    pause("action", delay).await;

    let (interval_ms, max_ms) = match policy {
        SettlePolicy::Fixed => return Ok(true),
        SettlePolicy::UntilStable { interval_ms, max_ms } => (*interval_ms, *max_ms),
    };

    let interval = Duration::from_millis(interval_ms);
    let deadline = Instant::now() + Duration::from_millis(max_ms);
    let mut previous = page.page_text().await?;

    loop {
        if Instant::now() >= deadline {
            info!(max_ms, "Página ainda mudando ao fim do polling");
            return Ok(false);
        }

        sleep(interval).await;
        let current = page.page_text().await?;

        if current == previous {
            debug!("Texto da página estável");
            return Ok(true);
        }
        previous = current;
    }
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::ScriptedPage;

    #[tokio::test]
    async fn test_pause_delays_correctly() {
        let elapsed = pause("test", Duration::from_millis(60)).await;
        assert!(elapsed >= 60);
        assert!(elapsed < 200);
    }

    #[tokio::test]
    async fn test_zero_pause_returns_immediately() {
        assert_eq!(pause("test", Duration::ZERO).await, 0);
    }

    #[tokio::test]
    async fn test_fixed_policy_never_reads_page() {
        let page = ScriptedPage::new().with_text("anything");
        let log = page.log();

        let stable = settle(&page, Duration::from_millis(10), &SettlePolicy::Fixed)
            .await
            .unwrap();

        assert!(stable);
        assert_eq!(log.lock().unwrap().text_reads, 0);
    }

    #[tokio::test]
    async fn test_until_stable_waits_for_identical_reads() {
        let page = ScriptedPage::new().with_text_sequence(&["Processing", "Processing.", "Server renewed"]);
        let log = page.log();
        let policy = SettlePolicy::UntilStable {
            interval_ms: 5,
            max_ms: 1_000,
        };

        let stable = settle(&page, Duration::ZERO, &policy).await.unwrap();

        assert!(stable);
        // 3 leituras distintas + 1 repetida para confirmar estabilidade.
        assert_eq!(log.lock().unwrap().text_reads, 4);
    }

    #[tokio::test]
    async fn test_until_stable_gives_up_at_max() {
        let page = ScriptedPage::new().with_text_sequence(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let policy = SettlePolicy::UntilStable {
            interval_ms: 20,
            max_ms: 30,
        };

        let stable = settle(&page, Duration::ZERO, &policy).await.unwrap();
        assert!(!stable);
    }

    #[test]
    fn test_policy_deserialization() {
        let fixed: SettlePolicy = serde_json::from_str(r#"{ "mode": "fixed" }"#).unwrap();
        assert_eq!(fixed, SettlePolicy::Fixed);

        let poll: SettlePolicy =
            serde_json::from_str(r#"{ "mode": "until_stable", "interval_ms": 250, "max_ms": 4000 }"#)
                .unwrap();
        assert_eq!(
            poll,
            SettlePolicy::UntilStable {
                interval_ms: 250,
                max_ms: 4000
            }
        );
    }
}
