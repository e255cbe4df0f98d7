use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use supportdesk_core::config::GatesConfig;
use supportdesk_core::domain::customer::UserContext;
use supportdesk_core::domain::guardrail::{InputVerdict, OutputVerdict};
use supportdesk_core::domain::specialist::{ActiveAgent, SpecialistId};

use crate::llm::{extract_json_object, ChatMessage, LlmClient};
use crate::router::{CategoryScores, NormalizedText};

const SMALL_TALK: &[&str] = &[
    "안녕",
    "반가",
    "고마",
    "감사",
    "수고",
    "hello",
    "hi",
    "hey",
    "thanks",
    "thank you",
    "good morning",
    "good evening",
];

const OFF_TOPIC: &[&str] = &[
    "날씨",
    "요리",
    "레시피",
    "주식",
    "투자",
    "정치",
    "선거",
    "숙제",
    "운세",
    "축구",
    "야구",
    "여행지",
    "weather",
    "recipe",
    "stock",
    "stocks",
    "invest",
    "politics",
    "election",
    "homework",
    "poem",
    "horoscope",
    "football",
    "joke",
];

const BILLING_LEAK: &[&str] =
    &["환불", "청구", "요금", "구독", "결제 내역", "refund", "invoice", "subscription", "billing"];

const ACCOUNT_LEAK: &[&str] = &[
    "이메일 변경",
    "계정 설정",
    "계정 비활성화",
    "계정 삭제",
    "재설정 토큰",
    "검증 코드",
    "email change",
    "account settings",
    "reset token",
];

const ORDER_LEAK: &[&str] = &[
    "운송장",
    "배송",
    "반품",
    "배달",
    "tracking number",
    "shipping",
    "delivery",
];

/// Prefixes of the action ids the tool catalog issues, per owning category.
const BILLING_ACTION_IDS: &[&str] = &["REF", "PAY", "CRD"];
const ACCOUNT_ACTION_IDS: &[&str] = &["RST", "2FA", "VER", "DEA", "EXP"];
const ORDER_ACTION_IDS: &[&str] = &["RET", "RDL", "SHP"];

/// Hangul syllables that may directly follow `원` when it is the currency unit.
const WON_PARTICLES: &[char] = &['이', '을', '은', '의', '에', '으', '입', '까', '짜'];

#[async_trait]
pub trait InputClassifier: Send + Sync {
    async fn classify(&self, request: &str, ctx: &UserContext) -> InputVerdict;
}

#[async_trait]
pub trait OutputClassifier: Send + Sync {
    async fn classify(&self, draft: &str, source: SpecialistId, ctx: &UserContext)
        -> OutputVerdict;
}

/// Rule engine over the routing vocabulary plus small-talk and off-topic lists.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn check_input(&self, request: &str) -> InputVerdict {
        let scores = CategoryScores::score(request);
        let domain_hits: usize =
            SpecialistId::ALL.iter().map(|category| scores.score_of(*category)).sum();
        let normalized = NormalizedText::new(request);
        let off_topic = normalized.matches(OFF_TOPIC);

        if !off_topic.is_empty() && off_topic.len() >= domain_hits {
            return InputVerdict::off_topic(format!(
                "request is about {} which is outside account, billing, order and technical support",
                off_topic.join(", ")
            ));
        }
        if domain_hits > 0 || !normalized.matches(SMALL_TALK).is_empty() {
            return InputVerdict::pass();
        }

        InputVerdict::undecided()
    }

    pub fn check_output(&self, draft: &str, source: SpecialistId) -> OutputVerdict {
        let normalized = NormalizedText::new(draft);
        let billing = contains_currency_amount(draft)
            || contains_action_id(draft, BILLING_ACTION_IDS)
            || !normalized.matches(BILLING_LEAK).is_empty();
        let account = contains_action_id(draft, ACCOUNT_ACTION_IDS)
            || !normalized.matches(ACCOUNT_LEAK).is_empty();
        let order = contains_tracking_number(draft)
            || contains_action_id(draft, ORDER_ACTION_IDS)
            || !normalized.matches(ORDER_LEAK).is_empty();

        OutputVerdict {
            contains_off_topic: !normalized.matches(OFF_TOPIC).is_empty(),
            contains_billing_data: billing && source != SpecialistId::Billing,
            contains_account_data: account && source != SpecialistId::Account,
            contains_order_data: order && source != SpecialistId::Order,
        }
    }
}

#[async_trait]
impl InputClassifier for KeywordClassifier {
    async fn classify(&self, request: &str, _ctx: &UserContext) -> InputVerdict {
        self.check_input(request)
    }
}

#[async_trait]
impl OutputClassifier for KeywordClassifier {
    async fn classify(
        &self,
        draft: &str,
        source: SpecialistId,
        _ctx: &UserContext,
    ) -> OutputVerdict {
        self.check_output(draft, source)
    }
}

/// `$49.99`, `49.99달러`, `12,000원`. A number ending in `.` before whitespace
/// is a list index, not an amount.
fn contains_currency_amount(text: &str) -> bool {
    let chars = text.chars().collect::<Vec<_>>();
    let mut index = 0;
    while index < chars.len() {
        let character = chars[index];
        if character == '$' && chars.get(index + 1).is_some_and(|next| next.is_ascii_digit()) {
            return true;
        }
        if !character.is_ascii_digit() {
            index += 1;
            continue;
        }
        let mut end = index;
        while end < chars.len()
            && (chars[end].is_ascii_digit() || matches!(chars[end], '.' | ','))
        {
            end += 1;
        }
        index = end;
        if chars[end - 1] == '.' && chars.get(end).map_or(true, |next| next.is_whitespace()) {
            continue;
        }
        let rest = chars[end..].iter().collect::<String>();
        let rest = rest.trim_start();
        if rest.starts_with("달러") || rest.starts_with("dollars") || starts_with_won_unit(rest) {
            return true;
        }
    }
    false
}

fn starts_with_won_unit(rest: &str) -> bool {
    let mut chars = rest.chars();
    if chars.next() != Some('원') {
        return false;
    }
    match chars.next() {
        Some(next @ '가'..='힣') => WON_PARTICLES.contains(&next),
        _ => true,
    }
}

/// Whole tokens shaped like `REF-1A2B3C4D5E`: a known prefix, a dash, then ten
/// uppercase hex digits.
fn contains_action_id(text: &str, prefixes: &[&str]) -> bool {
    text.split(|character: char| !(character.is_ascii_alphanumeric() || character == '-'))
        .filter_map(|token| token.split_once('-'))
        .any(|(prefix, suffix)| {
            prefixes.contains(&prefix)
                && suffix.len() == 10
                && suffix.chars().all(|character| matches!(character, '0'..='9' | 'A'..='F'))
        })
}

/// Carrier tracking numbers shaped like `1Z123456`.
fn contains_tracking_number(text: &str) -> bool {
    text.match_indices("1Z").any(|(index, _)| {
        let digits = text[index + 2..].chars().take(6);
        digits.filter(|character| character.is_ascii_digit()).count() == 6
    })
}

const INPUT_INSTRUCTIONS: &str = "사용자의 요청이 사용자 계정 정보, 결제 문의, 주문 정보, 기술 지원 문제 중 하나와 관련되어 있는지 확인하세요. \
대화 초반의 간단한 인사나 잡담은 허용합니다. 범위를 벗어난 요청이면 이유를 함께 반환하세요. \
다음 JSON 한 개만 답하세요: {\"is_off_topic\": bool, \"tripwire_reason\": string|null}";

const OUTPUT_INSTRUCTIONS: &str = "지원 응답 초안을 분석해서 담당 영역 밖의 정보가 포함되어 있는지 확인하세요. \
결제 정보(결제, 환불, 요금, 구독), 주문 정보(배송, 추적, 반품), 계정 관리 정보(비밀번호, 이메일 변경, 계정 설정), 지원과 무관한 내용을 각각 판단합니다. \
다음 JSON 한 개만 답하세요: {\"contains_off_topic\": bool, \"contains_billing_data\": bool, \"contains_account_data\": bool, \"contains_order_data\": bool}";

#[derive(Deserialize)]
struct ModelInputVerdict {
    is_off_topic: bool,
    #[serde(default)]
    tripwire_reason: Option<String>,
}

#[derive(Deserialize)]
struct ModelOutputVerdict {
    #[serde(default)]
    contains_off_topic: bool,
    #[serde(default)]
    contains_billing_data: bool,
    #[serde(default)]
    contains_account_data: bool,
    #[serde(default)]
    contains_order_data: bool,
}

/// Hosted-model classifier. Falls back to the keyword rules when the model call
/// fails or its answer is not a verdict.
pub struct ModelClassifier {
    client: Arc<dyn LlmClient>,
    fallback: KeywordClassifier,
}

impl ModelClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, fallback: KeywordClassifier }
    }

    async fn ask<T: for<'de> Deserialize<'de>>(
        &self,
        instructions: &str,
        content: String,
    ) -> Result<T, String> {
        let messages = [ChatMessage::system(instructions), ChatMessage::user(content)];
        let answer = self.client.complete(&messages).await.map_err(|error| error.to_string())?;
        let json = extract_json_object(&answer)
            .ok_or_else(|| format!("classifier answer had no json object: {answer}"))?;
        serde_json::from_str(json).map_err(|error| error.to_string())
    }
}

#[async_trait]
impl InputClassifier for ModelClassifier {
    async fn classify(&self, request: &str, _ctx: &UserContext) -> InputVerdict {
        match self.ask::<ModelInputVerdict>(INPUT_INSTRUCTIONS, request.to_string()).await {
            Ok(verdict) if verdict.is_off_topic => InputVerdict::off_topic(
                verdict.tripwire_reason.unwrap_or_else(|| "off-topic request".to_string()),
            ),
            Ok(_) => InputVerdict::pass(),
            Err(error) => {
                warn!(
                    event_name = "guardrail.input.classifier_fallback",
                    error = %error,
                    "input classifier unavailable, using keyword rules"
                );
                InputVerdict { low_confidence: true, ..self.fallback.check_input(request) }
            }
        }
    }
}

#[async_trait]
impl OutputClassifier for ModelClassifier {
    async fn classify(
        &self,
        draft: &str,
        source: SpecialistId,
        _ctx: &UserContext,
    ) -> OutputVerdict {
        let content = format!("담당 영역: {source}\n\n응답 초안:\n{draft}");
        match self.ask::<ModelOutputVerdict>(OUTPUT_INSTRUCTIONS, content).await {
            Ok(verdict) => OutputVerdict {
                contains_off_topic: verdict.contains_off_topic,
                contains_billing_data: verdict.contains_billing_data
                    && source != SpecialistId::Billing,
                contains_account_data: verdict.contains_account_data
                    && source != SpecialistId::Account,
                contains_order_data: verdict.contains_order_data && source != SpecialistId::Order,
            },
            Err(error) => {
                warn!(
                    event_name = "guardrail.output.classifier_fallback",
                    error = %error,
                    "output classifier unavailable, using keyword rules"
                );
                self.fallback.check_output(draft, source)
            }
        }
    }
}

/// Pre-routing scope check, active only for the configured entry agents.
pub struct InputGate {
    classifier: Arc<dyn InputClassifier>,
    active_for: BTreeSet<ActiveAgent>,
    refusal: String,
}

impl InputGate {
    pub fn new(
        classifier: Arc<dyn InputClassifier>,
        active_for: BTreeSet<ActiveAgent>,
        refusal: impl Into<String>,
    ) -> Self {
        Self { classifier, active_for, refusal: refusal.into() }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn InputClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn applies_to(&self, entry: ActiveAgent) -> bool {
        self.active_for.contains(&entry)
    }

    pub async fn check(&self, request: &str, ctx: &UserContext) -> InputVerdict {
        self.classifier.classify(request, ctx).await
    }

    pub fn refusal(&self) -> &str {
        &self.refusal
    }
}

/// Cross-domain leak check on specialist drafts.
pub struct OutputGate {
    classifier: Arc<dyn OutputClassifier>,
    active_for: BTreeSet<SpecialistId>,
    refusal: String,
}

impl OutputGate {
    pub fn new(
        classifier: Arc<dyn OutputClassifier>,
        active_for: BTreeSet<SpecialistId>,
        refusal: impl Into<String>,
    ) -> Self {
        Self { classifier, active_for, refusal: refusal.into() }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn OutputClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn applies_to(&self, source: SpecialistId) -> bool {
        self.active_for.contains(&source)
    }

    pub async fn check(
        &self,
        draft: &str,
        source: SpecialistId,
        ctx: &UserContext,
    ) -> OutputVerdict {
        self.classifier.classify(draft, source, ctx).await
    }

    pub fn refusal(&self) -> &str {
        &self.refusal
    }
}

/// Builds both gates from configuration. A model-backed classifier is used only
/// when one is configured and a client is available.
pub fn gates_from_config(
    config: &GatesConfig,
    llm: Option<Arc<dyn LlmClient>>,
) -> (InputGate, OutputGate) {
    use supportdesk_core::config::ClassifierKind;

    let (input, output) = match (config.classifier, llm) {
        (ClassifierKind::Model, Some(client)) => {
            let model = Arc::new(ModelClassifier::new(client));
            (
                Arc::clone(&model) as Arc<dyn InputClassifier>,
                model as Arc<dyn OutputClassifier>,
            )
        }
        _ => (
            Arc::new(KeywordClassifier) as Arc<dyn InputClassifier>,
            Arc::new(KeywordClassifier) as Arc<dyn OutputClassifier>,
        ),
    };

    (
        InputGate::new(input, config.input.clone(), config.input_refusal.clone()),
        OutputGate::new(output, config.output.clone(), config.output_refusal.clone()),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use supportdesk_core::config::AppConfig;
    use supportdesk_core::domain::customer::{Tier, UserContext};
    use supportdesk_core::domain::specialist::{ActiveAgent, SpecialistId};

    use super::{
        contains_action_id, contains_currency_amount, gates_from_config, InputClassifier,
        KeywordClassifier, ModelClassifier, OutputClassifier, BILLING_ACTION_IDS,
    };
    use crate::llm::{ChatMessage, LlmClient};

    struct FixedAnswer(&'static str);

    #[async_trait]
    impl LlmClient for FixedAnswer {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl LlmClient for Unreachable {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            Err(anyhow!("connection refused"))
        }
    }

    fn ctx() -> UserContext {
        UserContext::new("1", "nana", "ktra@example.com", Tier::Basic)
    }

    #[test]
    fn domain_requests_and_greetings_pass() {
        let rules = KeywordClassifier;
        assert!(!rules.check_input("환불이 필요해요").is_tripped());
        assert!(!rules.check_input("안녕하세요!").is_tripped());
        assert!(!rules.check_input("안녕하세요!").low_confidence);
    }

    #[test]
    fn off_topic_request_trips_with_reason() {
        let verdict = KeywordClassifier.check_input("오늘 날씨 어때요?");
        assert!(verdict.is_tripped());
        assert!(verdict.tripwire_reason.as_deref().unwrap_or_default().contains("날씨"));
    }

    #[test]
    fn off_topic_request_with_a_stray_domain_word_trips() {
        let verdict = KeywordClassifier.check_input("주식 투자 앱 추천해줘");
        assert!(verdict.is_tripped());
        assert!(verdict.tripwire_reason.as_deref().unwrap_or_default().contains("주식"));

        assert!(KeywordClassifier.check_input("write a poem about my account").is_tripped());
    }

    #[test]
    fn domain_signal_outweighing_off_topic_words_passes() {
        let verdict = KeywordClassifier.check_input("주식 앱 결제가 두 번 청구됐어요 환불해 주세요");
        assert!(!verdict.is_tripped());
    }

    #[test]
    fn undecidable_request_passes_with_low_confidence() {
        let verdict = KeywordClassifier.check_input("12345번이에요");
        assert!(!verdict.is_tripped());
        assert!(verdict.low_confidence);
    }

    #[test]
    fn technical_draft_with_billing_amount_is_flagged() {
        let verdict =
            KeywordClassifier.check_output("$49.99 환불 처리해 드렸습니다", SpecialistId::Technical);
        assert!(verdict.contains_billing_data);
        assert!(verdict.is_tripped());
    }

    #[test]
    fn own_domain_content_is_never_a_leak() {
        let verdict =
            KeywordClassifier.check_output("환불 ID: REF-1 금액: $49.99", SpecialistId::Billing);
        assert!(!verdict.is_tripped());

        let verdict =
            KeywordClassifier.check_output("운송장: 1Z123456 배송 중", SpecialistId::Order);
        assert!(!verdict.is_tripped());
    }

    #[test]
    fn troubleshooting_steps_are_clean_technical_output() {
        let draft = "login 이슈에 대한 트러블슈팅 단계:\n1. 사용자명과 비밀번호 확인\n4. 필요 시 비밀번호 재설정";
        assert!(!KeywordClassifier.check_output(draft, SpecialistId::Technical).is_tripped());
    }

    #[test]
    fn hyphenated_words_and_list_indexes_are_clean_technical_output() {
        let drafts = [
            "Please clear the server-side cache and reload the page.",
            "This is a first-time setup issue, so run the installer again.",
            "Rotate the secret-key in the admin console, then restart the app.",
            "1. 앱을 재시작하세요\n2. 원격 지원을 요청하세요",
            "3. 원인을 확인한 뒤 캐시를 비워 주세요",
        ];
        for draft in drafts {
            let verdict = KeywordClassifier.check_output(draft, SpecialistId::Technical);
            assert!(!verdict.is_tripped(), "{draft} should pass: {verdict:?}");
            assert!(verdict.flagged_categories().is_empty(), "{draft} flagged");
        }
    }

    #[test]
    fn issued_action_ids_in_technical_output_are_flagged() {
        let verdict =
            KeywordClassifier.check_output("처리 번호는 PAY-1A2B3C4D5E 입니다", SpecialistId::Technical);
        assert!(verdict.contains_billing_data);

        let verdict =
            KeywordClassifier.check_output("토큰 RST-00FF00FF00 을 사용하세요", SpecialistId::Technical);
        assert!(verdict.contains_account_data);
        assert!(verdict.is_tripped());
    }

    #[test]
    fn action_ids_match_whole_uppercase_tokens_only() {
        assert!(contains_action_id("REF-1A2B3C4D5E", BILLING_ACTION_IDS));
        assert!(contains_action_id("(ID: CRD-0123456789)", BILLING_ACTION_IDS));
        assert!(!contains_action_id("ref-1a2b3c4d5e", BILLING_ACTION_IDS));
        assert!(!contains_action_id("REF-1A2B3C", BILLING_ACTION_IDS));
        assert!(!contains_action_id("pay-per-use plan", BILLING_ACTION_IDS));
    }

    #[test]
    fn order_vocabulary_in_technical_output_is_recorded_but_not_refused() {
        let verdict =
            KeywordClassifier.check_output("앱 업데이트 후 배송 알림이 다시 옵니다", SpecialistId::Technical);
        assert!(verdict.contains_order_data);
        assert!(!verdict.is_tripped());
    }

    #[test]
    fn currency_patterns() {
        assert!(contains_currency_amount("총 12,000원 입니다"));
        assert!(contains_currency_amount("12,000원을 환불했어요"));
        assert!(contains_currency_amount("49.99 달러"));
        assert!(contains_currency_amount("합계 $5."));
        assert!(!contains_currency_amount("캐시 85% 사용"));
        assert!(!contains_currency_amount("2. 원격 지원"));
        assert!(!contains_currency_amount("3 원인 분석"));
    }

    #[tokio::test]
    async fn model_verdict_is_used_when_parseable() {
        let classifier = ModelClassifier::new(Arc::new(FixedAnswer(
            "```json\n{\"is_off_topic\": true, \"tripwire_reason\": \"recipe request\"}\n```",
        )));
        let verdict = InputClassifier::classify(&classifier, "환불해 주세요", &ctx()).await;
        assert!(verdict.is_tripped());
        assert_eq!(verdict.tripwire_reason.as_deref(), Some("recipe request"));
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_rules_with_low_confidence() {
        let classifier = ModelClassifier::new(Arc::new(Unreachable));

        let verdict = InputClassifier::classify(&classifier, "주문 상태 알려주세요", &ctx()).await;
        assert!(!verdict.is_tripped());
        assert!(verdict.low_confidence);

        let output = OutputClassifier::classify(
            &classifier,
            "$10 환불 완료",
            SpecialistId::Technical,
            &ctx(),
        )
        .await;
        assert!(output.contains_billing_data);
    }

    #[tokio::test]
    async fn model_cannot_flag_the_source_domain() {
        let classifier = ModelClassifier::new(Arc::new(FixedAnswer(
            "{\"contains_billing_data\": true, \"contains_order_data\": false}",
        )));
        let verdict = OutputClassifier::classify(
            &classifier,
            "환불 처리됨",
            SpecialistId::Billing,
            &ctx(),
        )
        .await;
        assert!(!verdict.is_tripped());
    }

    #[test]
    fn default_gate_activation_follows_configuration() {
        let config = AppConfig::default();
        let (input, output) = gates_from_config(&config.gates, None);

        assert!(input.applies_to(ActiveAgent::Triage));
        assert!(output.applies_to(SpecialistId::Technical));
        assert!(!output.applies_to(SpecialistId::Billing));
        assert_eq!(input.refusal(), "I can't help you with that.");
        assert_eq!(output.refusal(), "Cant show you that answer.");
    }
}
