//! Bot copy and per-step keyword tables for the lead-capture dialogue.

use std::time::Duration;

use super::model::Interest;

/// Delay before a direct reply is shown.
pub const REPLY_DELAY: Duration = Duration::from_millis(500);
/// Delay for the first follow-up after a direct reply.
pub const FOLLOW_UP_DELAY: Duration = Duration::from_millis(1500);
/// Delay for the second follow-up, and for ending the session after goodbye.
pub const LATE_FOLLOW_UP_DELAY: Duration = Duration::from_millis(2000);
/// Delay before the opening greeting.
pub const GREETING_DELAY: Duration = Duration::from_millis(1000);

pub const GREETING: &str =
    "Olá! 👋 Sou a assistente virtual da Efika Corretora. Como posso ajudá-lo hoje?";
pub const MENU_PROMPT: &str = "Escolha uma das opções abaixo ou digite sua dúvida:";
pub const HOW_CAN_I_HELP: &str = "Como posso ajudá-lo?";
pub const MENU_NOT_UNDERSTOOD: &str = "Não entendi sua escolha. Por favor, selecione uma das opções disponíveis ou digite \"menu\" para ver as opções novamente.";
pub const INITIAL_NOT_UNDERSTOOD: &str =
    "Não entendi. Digite \"menu\" para ver as opções disponíveis.";
pub const INVALID_EMAIL: &str = "Por favor, digite um e-mail válido.";
pub const ASK_PHONE: &str = "Perfeito! Agora seu telefone para contato:";
pub const ANYTHING_ELSE: &str = "Posso ajudar com mais alguma coisa? Digite \"menu\" para ver as opções ou \"sair\" para encerrar.";
pub const FINAL_HINT: &str =
    "Digite \"menu\" para ver as opções ou \"sair\" para encerrar o atendimento.";
pub const FAREWELL: &str = "Foi um prazer atendê-lo! Tenha um ótimo dia! 😊";

pub const FAQ_INTRO: &str = "Aqui estão as perguntas mais frequentes:";
pub const FAQ_LIST: &str = "1. Como funciona o seguro saúde?\n2. Qual o prazo de carência?\n3. Posso incluir dependentes?\n4. Como acionar o seguro?";
pub const FAQ_OUTRO: &str =
    "Digite o número da pergunta ou \"menu\" para voltar às opções principais.";

pub const CONTACT_INTRO: &str =
    "Aqui estão nossos contatos para falar diretamente com um consultor:";
pub const CONTACT_DETAILS: &str = "📞 Telefone: (11) 9999-9999\n📧 E-mail: contato@efikacorretora.com.br\n📍 Endereço: Av. Paulista, 1000 - São Paulo, SP";
pub const CONTACT_HOURS: &str = "Nosso horário de atendimento é de segunda a sexta, das 8h às 18h. Digite \"menu\" para voltar às opções.";

/// Buttons offered while in the menu step.
pub const MENU_QUICK_REPLIES: &[&str] = &[
    "💊 Seguro Saúde",
    "💝 Seguro de Vida",
    "🏢 Seguro Empresarial",
    "❓ Dúvidas Frequentes",
    "👤 Falar com Consultor",
];

pub fn greet_by_name(name: &str) -> String {
    format!("Prazer em conhecê-lo, {name}! Agora preciso do seu e-mail para enviar a cotação.")
}

pub fn thank_by_name(name: &str) -> String {
    format!(
        "Obrigada, {name}! Seus dados foram registrados. Um de nossos consultores entrará em contato em breve."
    )
}

/// Acknowledgement and name question for a quote request.
#[derive(Debug, PartialEq, Eq)]
pub struct QuoteOpening {
    pub interest: Interest,
    pub ack: &'static str,
    pub ask: &'static str,
}

pub const SAUDE_QUOTE: QuoteOpening = QuoteOpening {
    interest: Interest::Saude,
    ack: "Excelente! Nossos planos de saúde oferecem cobertura completa com a melhor rede credenciada. Para uma cotação personalizada, preciso de alguns dados.",
    ask: "Qual é o seu nome?",
};

pub const VIDA_QUOTE: QuoteOpening = QuoteOpening {
    interest: Interest::Vida,
    ack: "Ótima escolha! Nosso seguro de vida oferece proteção financeira completa para você e sua família.",
    ask: "Para prosseguir, qual é o seu nome?",
};

pub const EMPRESARIAL_QUOTE: QuoteOpening = QuoteOpening {
    interest: Interest::Empresarial,
    ack: "Perfeito! Temos soluções completas para proteger seu negócio. Vamos conversar sobre suas necessidades.",
    ask: "Primeiro, como posso chamá-lo?",
};

/// A set of keywords mapped to an outcome. Matches when the lower-cased input
/// contains any keyword.
#[derive(Debug)]
pub struct KeywordRule<T: 'static> {
    pub keywords: &'static [&'static str],
    pub outcome: T,
}

/// Outcomes of the menu step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Quote(&'static QuoteOpening),
    Faq,
    Contact,
    ShowOptions,
}

/// Outcomes of the initial and final steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavChoice {
    Menu,
    Exit,
}

/// Checked in order; the first matching rule wins. The FAQ rule comes first
/// because "dúvidas" contains "vida".
pub static MENU_RULES: &[KeywordRule<MenuChoice>] = &[
    KeywordRule { keywords: &["faq", "dúvidas"], outcome: MenuChoice::Faq },
    KeywordRule { keywords: &["saúde"], outcome: MenuChoice::Quote(&SAUDE_QUOTE) },
    KeywordRule { keywords: &["vida"], outcome: MenuChoice::Quote(&VIDA_QUOTE) },
    KeywordRule { keywords: &["empresarial"], outcome: MenuChoice::Quote(&EMPRESARIAL_QUOTE) },
    KeywordRule { keywords: &["contato", "humano", "consultor"], outcome: MenuChoice::Contact },
    KeywordRule { keywords: &["menu"], outcome: MenuChoice::ShowOptions },
];

pub static FINAL_RULES: &[KeywordRule<NavChoice>] = &[
    KeywordRule { keywords: &["menu"], outcome: NavChoice::Menu },
    KeywordRule { keywords: &["sair"], outcome: NavChoice::Exit },
];

pub static INITIAL_RULES: &[KeywordRule<NavChoice>] =
    &[KeywordRule { keywords: &["menu"], outcome: NavChoice::Menu }];

/// Find the first rule whose keywords occur in `input`.
///
/// `input` must already be lower-cased.
pub fn match_rule<T: Copy>(rules: &[KeywordRule<T>], input: &str) -> Option<T> {
    rules
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| input.contains(kw)))
        .map(|rule| rule.outcome)
}
