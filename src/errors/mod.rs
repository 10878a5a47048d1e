//! # Módulo de Códigos de Erro Estruturados
//!
//! Define códigos de erro padronizados para que a saída do `renewer`
//! (relatório JSON, logs, código de saída) seja fácil de filtrar em
//! alertas e dashboards.
//!
//! ## Para todos entenderem:
//!
//! Quando uma renovação falha, o motivo legível (`"timeout"`,
//! `"element not found for role input"`) vai no `Outcome`. O código
//! numérico vai junto no relatório e identifica exatamente o que
//! aconteceu, mesmo que a mensagem mude.
//!
//! ## Categorias de Erro
//!
//! | Faixa  | Categoria       | Descrição                          |
//! |--------|-----------------|------------------------------------|
//! | E1xxx  | Configuração    | Arquivo de configuração inválido   |
//! | E2xxx  | Driver          | Falha do navegador/página          |
//! | E3xxx  | Descoberta      | Elemento não encontrado na página  |
//! | E4xxx  | Ambiente        | Arquivos, variáveis de ambiente    |
//! | E5xxx  | Interno         | Bug no próprio Runner              |
//!
//! ## Exemplo:
//!
//! ```text
//! Error E3001: element not found for role input
//!   Estratégias tentadas: 7
//! ```

use std::fmt;

// ============================================================================
// CÓDIGO DE ERRO
// ============================================================================

/// Código de erro estruturado com categoria e número.
///
/// O código é um número de 4 dígitos onde:
/// - Primeiro dígito: categoria (1-5)
/// - Últimos 3 dígitos: erro específico (001-999)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // ========================================================================
    // E1xxx: Configuração
    // ========================================================================

    /// Lista de estratégias vazia.
    /// Causa: `input_selectors` ou `action_selectors` sem nenhum item.
    pub const EMPTY_STRATEGIES: Self = Self(1001);

    /// Seletor com sintaxe inválida.
    /// Causa: `:has-text(` sem aspas ou parêntese de fechamento.
    pub const INVALID_SELECTOR: Self = Self(1002);

    /// URL alvo inválida.
    /// Causa: `target_url` não começa com http:// ou https://.
    pub const INVALID_TARGET_URL: Self = Self(1003);

    /// Valor de preenchimento ausente.
    /// Causa: `fill_value` vazio depois da interpolação.
    pub const MISSING_FILL_VALUE: Self = Self(1004);

    /// Conjunto de palavras-chave ou frases vazio.
    /// Causa: `action_keywords`, `cooldown_phrases` ou `success_phrases` vazios.
    pub const EMPTY_PHRASES: Self = Self(1005);

    /// Timeout configurado inválido.
    /// Causa: `timeout_ms` igual a zero.
    pub const INVALID_TIMEOUT: Self = Self(1006);

    /// JSON de configuração inválido.
    /// Causa: Arquivo com sintaxe inválida ou campo com tipo errado.
    pub const INVALID_CONFIG_FORMAT: Self = Self(1007);

    // ========================================================================
    // E2xxx: Driver da página
    // ========================================================================

    /// Operação do driver excedeu o timeout.
    pub const DRIVER_TIMEOUT: Self = Self(2001);

    /// Falha ao iniciar o navegador.
    pub const DRIVER_LAUNCH: Self = Self(2002);

    /// Falha na navegação até a URL alvo.
    pub const NAVIGATION_FAILED: Self = Self(2003);

    /// Falha em uma operação sobre a página (fill, click, leitura).
    pub const DRIVER_OPERATION: Self = Self(2004);

    // ========================================================================
    // E3xxx: Descoberta de elementos
    // ========================================================================

    /// Campo de texto não encontrado por nenhuma estratégia.
    pub const INPUT_NOT_FOUND: Self = Self(3001);

    /// Botão de ação não encontrado, nem pela varredura ampla.
    pub const ACTION_NOT_FOUND: Self = Self(3002);

    // ========================================================================
    // E4xxx: Ambiente
    // ========================================================================

    /// Variável de ambiente não definida.
    /// Causa: `${ENV_VAR}` usada mas VAR não existe.
    pub const ENV_VAR_NOT_FOUND: Self = Self(4001);

    /// Arquivo de configuração não encontrado.
    pub const CONFIG_FILE_NOT_FOUND: Self = Self(4002);

    /// Falha ao gravar relatório ou diagnóstico.
    pub const OUTPUT_WRITE_FAILED: Self = Self(4003);

    // ========================================================================
    // E5xxx: Erros Internos
    // ========================================================================

    /// Erro interno inesperado.
    pub const INTERNAL_ERROR: Self = Self(5001);

    /// Erro de serialização do relatório.
    pub const SERIALIZATION_ERROR: Self = Self(5002);

    // ========================================================================
    // MÉTODOS
    // ========================================================================

    /// Retorna o código formatado com prefixo "E".
    ///
    /// Exemplo: ErrorCode::INPUT_NOT_FOUND.formatted() == "E3001"
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    /// Retorna a categoria do erro baseado no primeiro dígito.
    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Configuration,
            2 => ErrorCategory::Driver,
            3 => ErrorCategory::Discovery,
            4 => ErrorCategory::Environment,
            5 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Retorna uma descrição curta do erro.
    pub fn description(&self) -> &'static str {
        match self.0 {
            1001 => "Lista de estratégias vazia",
            1002 => "Seletor inválido",
            1003 => "URL alvo inválida",
            1004 => "Valor de preenchimento ausente",
            1005 => "Conjunto de frases vazio",
            1006 => "Timeout inválido",
            1007 => "Formato de configuração inválido",
            2001 => "Timeout do driver",
            2002 => "Falha ao iniciar navegador",
            2003 => "Falha de navegação",
            2004 => "Falha de operação na página",
            3001 => "Campo de texto não encontrado",
            3002 => "Botão de ação não encontrado",
            4001 => "Variável de ambiente não definida",
            4002 => "Arquivo de configuração não encontrado",
            4003 => "Falha ao gravar saída",
            5001 => "Erro interno",
            5002 => "Erro de serialização",
            _ => "Erro desconhecido",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// ============================================================================
// CATEGORIA DE ERRO
// ============================================================================

/// Categoria de erro baseada no primeiro dígito do código.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuração inválida (E1xxx).
    Configuration,

    /// Falha do navegador ou da página (E2xxx).
    Driver,

    /// Elemento não encontrado (E3xxx).
    /// A página provavelmente mudou de layout.
    Discovery,

    /// Arquivos e variáveis de ambiente (E4xxx).
    Environment,

    /// Bug no Runner (E5xxx).
    Internal,

    /// Código fora das faixas conhecidas.
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuração"),
            Self::Driver => write!(f, "Driver"),
            Self::Discovery => write!(f, "Descoberta"),
            Self::Environment => write!(f, "Ambiente"),
            Self::Internal => write!(f, "Interno"),
            Self::Unknown => write!(f, "Desconhecido"),
        }
    }
}

/// Erro estruturado com código, mensagem e contexto.
#[derive(Debug)]
pub struct StructuredError {
    /// Código do erro.
    pub code: ErrorCode,
    /// Mensagem detalhada.
    pub message: String,
    /// Contexto adicional.
    pub context: Option<ErrorContext>,
}

/// Contexto adicional do erro.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Papel do elemento procurado ("input", "action").
    pub role: Option<String>,
    /// Operação do driver envolvida.
    pub operation: Option<String>,
    /// Campo de configuração relacionado.
    pub field: Option<String>,
}

impl StructuredError {
    /// Cria um novo erro estruturado.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Adiciona contexto ao erro.
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Adiciona o campo de configuração ao contexto.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::default);
        ctx.field = Some(field.into());
        self
    }

    /// Formata o erro para exibição ao usuário.
    pub fn user_message(&self) -> String {
        let mut msg = format!("[{}] {}", self.code, self.message);

        if let Some(ctx) = &self.context {
            if let Some(role) = &ctx.role {
                msg.push_str(&format!(" (papel: {})", role));
            }
            if let Some(operation) = &ctx.operation {
                msg.push_str(&format!(" (operação: {})", operation));
            }
            if let Some(field) = &ctx.field {
                msg.push_str(&format!(" (campo: {})", field));
            }
        }

        msg
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for StructuredError {}
