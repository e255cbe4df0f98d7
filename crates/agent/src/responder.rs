//! Specialist execution: turn a routed request into a draft answer, calling
//! tools from the specialist's subset along the way.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use supportdesk_core::config::{ResponderConfig, ResponderKind};
use supportdesk_core::domain::customer::UserContext;
use supportdesk_core::domain::handoff::HandoffRecord;
use supportdesk_core::domain::session::{Speaker, Turn};
use supportdesk_core::domain::specialist::SpecialistId;

use crate::llm::{extract_json_object, ChatMessage, LlmClient};
use crate::router::{category_label, NormalizedText};
use crate::specialists::SpecialistProfile;
use crate::tools::{ToolCatalog, ToolId};

/// Everything a specialist sees for one turn.
#[derive(Clone, Copy, Debug)]
pub struct SpecialistRequest<'a> {
    pub specialist: SpecialistId,
    pub prompt: &'a str,
    pub ctx: &'a UserContext,
    pub history: &'a [Turn],
    pub request: &'a str,
    pub handoff: Option<&'a HandoffRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: Value,
    pub output: String,
    pub succeeded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), tool_calls: Vec::new() }
    }
}

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("model call failed: {0}")]
    Model(String),
    #[error("no final answer after {0} tool rounds")]
    ToolRoundsExhausted(u32),
}

#[async_trait]
pub trait SpecialistResponder: Send + Sync {
    async fn respond(
        &self,
        request: SpecialistRequest<'_>,
        tools: &ToolCatalog,
    ) -> Result<Draft, ResponderError>;
}

pub fn responder_from_config(
    config: &ResponderConfig,
    llm: Option<Arc<dyn LlmClient>>,
) -> Arc<dyn SpecialistResponder> {
    match (config.kind, llm) {
        (ResponderKind::Model, Some(client)) => {
            Arc::new(ModelResponder::new(client, config.max_tool_rounds))
        }
        _ => Arc::new(ScriptedResponder),
    }
}

/// Offline responder: picks one tool by keyword, pulls its arguments out of
/// the conversation and phrases the result for the customer.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptedResponder;

enum Plan {
    Call(ToolId, Value),
    Ask(&'static str),
    Chat,
}

#[async_trait]
impl SpecialistResponder for ScriptedResponder {
    async fn respond(
        &self,
        request: SpecialistRequest<'_>,
        tools: &ToolCatalog,
    ) -> Result<Draft, ResponderError> {
        let ctx = request.ctx;
        let recent = recent_user_text(request.history, request.request);
        let plan = match request.specialist {
            SpecialistId::Account => plan_account(request.request, &recent, ctx),
            SpecialistId::Billing => plan_billing(request.request, &recent),
            SpecialistId::Order => plan_order(request.request, &recent),
            SpecialistId::Technical => plan_technical(request.request, &recent, ctx),
        };

        let greeting = match request.handoff {
            Some(handoff) => match handoff.priority_note() {
                Some(_) => format!(
                    "{}님, {} 담당자입니다. 우선 처리 대상으로 접수되었어요.",
                    ctx.name(),
                    category_label(request.specialist)
                ),
                None => format!("{}님, {} 담당자입니다.", ctx.name(), category_label(request.specialist)),
            },
            None => format!("{}님,", ctx.name()),
        };

        match plan {
            Plan::Call(tool, arguments) => {
                debug!(
                    event_name = "responder.scripted.tool_selected",
                    specialist = %request.specialist,
                    tool = %tool,
                    "scripted responder selected tool"
                );
                let invocation =
                    tools.invoke(request.specialist, tool.as_str(), ctx, arguments.clone()).await;
                let text = if invocation.succeeded {
                    format!("{greeting} 요청하신 내용을 처리했어요.\n\n{}", invocation.output)
                } else {
                    format!(
                        "{greeting} 요청을 처리하지 못했어요. 잠시 후 다시 시도해 주시거나 다른 방법으로 도와드릴게요.\n\n{}",
                        invocation.output
                    )
                };
                Ok(Draft {
                    text,
                    tool_calls: vec![ToolCallRecord {
                        tool: invocation.tool,
                        arguments,
                        output: invocation.output,
                        succeeded: invocation.succeeded,
                    }],
                })
            }
            Plan::Ask(question) => Ok(Draft::text(format!("{greeting} {question}"))),
            Plan::Chat => Ok(Draft::text(format!(
                "{greeting} 어떤 도움이 필요하신지 조금 더 자세히 말씀해 주세요. {}",
                chat_hint(request.specialist)
            ))),
        }
    }
}

fn chat_hint(specialist: SpecialistId) -> &'static str {
    match specialist {
        SpecialistId::Account => "비밀번호 재설정, 2단계 인증, 이메일 변경, 데이터 내보내기를 도와드릴 수 있어요.",
        SpecialistId::Billing => "결제 내역 조회, 환불, 결제 수단 변경, 크레딧 적용을 도와드릴 수 있어요.",
        SpecialistId::Order => "주문 조회, 반품, 재배송 예약, 배송 속도 업그레이드를 도와드릴 수 있어요.",
        SpecialistId::Technical => "진단 점검, 단계별 해결 방법, 엔지니어링 에스컬레이션을 도와드릴 수 있어요.",
    }
}

/// The last two user messages plus the current request, so follow-ups that
/// only carry a number still find their intent.
fn recent_user_text(history: &[Turn], request: &str) -> String {
    let mut parts = history
        .iter()
        .rev()
        .filter(|turn| turn.speaker == Speaker::User)
        .take(2)
        .map(|turn| turn.content.as_str())
        .collect::<Vec<_>>();
    parts.reverse();
    parts.push(request);
    parts.join("\n")
}

fn any_of(text: &NormalizedText, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

fn plan_account(request: &str, recent: &str, ctx: &UserContext) -> Plan {
    let text = NormalizedText::new(recent);
    let current = NormalizedText::new(request);

    if any_of(&current, &["2단계", "2fa", "two-factor", "otp", "인증 앱"]) {
        let method = if any_of(&current, &["sms", "문자"]) {
            "sms"
        } else if any_of(&current, &["email", "메일로"]) {
            "email"
        } else {
            "app"
        };
        return Plan::Call(ToolId::EnableTwoFactor, json!({ "method": method }));
    }
    if any_of(&text, &["이메일 변경", "이메일을 변경", "이메일 바꾸", "새 이메일", "change email", "update email"])
        || extract_email(request).is_some_and(|email| !email.eq_ignore_ascii_case(ctx.email()))
    {
        return match extract_email(request).or_else(|| extract_email(recent)) {
            Some(email) => Plan::Call(ToolId::UpdateEmail, json!({ "new_email": email })),
            None => Plan::Ask("변경하실 새 이메일 주소를 알려주세요."),
        };
    }
    if any_of(&current, &["탈퇴", "비활성화", "계정 삭제", "deactivate", "close my account"]) {
        return Plan::Call(
            ToolId::DeactivateAccount,
            json!({ "reason": request.trim(), "feedback": Value::Null }),
        );
    }
    if any_of(&current, &["내보내기", "다운로드", "내 데이터", "export", "download"]) {
        let mut types = Vec::new();
        for (keywords, label) in [
            (&["프로필", "profile"][..], "profile"),
            (&["주문", "orders", "order"][..], "orders"),
            (&["결제", "청구", "billing"][..], "billing"),
        ] {
            if any_of(&current, keywords) {
                types.push(label);
            }
        }
        if types.is_empty() {
            types = vec!["profile", "orders", "billing"];
        }
        return Plan::Call(ToolId::ExportAccountData, json!({ "data_types": types.join(", ") }));
    }
    if any_of(&text, &["비밀번호", "로그인", "password", "login", "log in", "sign in", "reset"]) {
        return Plan::Call(ToolId::ResetPassword, json!({}));
    }
    Plan::Chat
}

fn plan_billing(request: &str, recent: &str) -> Plan {
    let text = NormalizedText::new(recent);
    let current = NormalizedText::new(request);

    if any_of(&text, &["환불", "refund"]) {
        return match extract_amount(request).or_else(|| extract_amount(recent)) {
            Some(amount) => Plan::Call(
                ToolId::ProcessRefund,
                json!({ "refund_amount": amount.to_string(), "reason": request.trim() }),
            ),
            None => Plan::Ask("환불 받으실 금액을 알려주시면 바로 처리해 드릴게요."),
        };
    }
    if any_of(&text, &["크레딧", "보상", "credit", "compensation"]) {
        return match extract_amount(request).or_else(|| extract_amount(recent)) {
            Some(amount) => Plan::Call(
                ToolId::ApplyBillingCredit,
                json!({ "credit_amount": amount.to_string(), "reason": request.trim() }),
            ),
            None => Plan::Ask("적용할 크레딧 금액을 알려주세요."),
        };
    }
    if any_of(&current, &["결제 수단", "카드 변경", "카드를 바꾸", "payment method", "paypal", "페이팔", "계좌"]) {
        let payment_type = if any_of(&current, &["paypal", "페이팔"]) {
            "paypal"
        } else if any_of(&current, &["계좌", "이체", "bank"]) {
            "bank_transfer"
        } else {
            "credit_card"
        };
        return Plan::Call(ToolId::UpdatePaymentMethod, json!({ "payment_type": payment_type }));
    }
    let months = extract_months(request);
    Plan::Call(ToolId::LookupBillingHistory, json!({ "months_back": months }))
}

fn plan_order(request: &str, recent: &str) -> Plan {
    let text = NormalizedText::new(recent);
    let order_number = extract_order_number(request).or_else(|| extract_order_number(recent));

    if any_of(&text, &["재배송", "다시 배송", "redeliver", "redelivery"]) {
        let tracking = extract_tracking_number(request).or_else(|| extract_tracking_number(recent));
        let date = extract_date(request).or_else(|| extract_date(recent));
        return match (tracking, date) {
            (Some(tracking), Some(date)) => Plan::Call(
                ToolId::ScheduleRedelivery,
                json!({ "tracking_number": tracking, "preferred_date": date }),
            ),
            (None, _) => Plan::Ask("재배송을 예약하려면 운송장 번호(1Z로 시작)를 알려주세요."),
            (Some(_), None) => Plan::Ask("원하시는 배송 날짜를 YYYY-MM-DD 형식이나 '내일'로 알려주세요."),
        };
    }
    if any_of(&text, &["빨리", "빠르게", "특급", "급해", "expedite", "faster", "rush"]) {
        return match order_number {
            Some(order_number) => {
                Plan::Call(ToolId::ExpediteShipping, json!({ "order_number": order_number }))
            }
            None => Plan::Ask("배송 속도를 올릴 주문 번호를 알려주세요."),
        };
    }
    if any_of(&text, &["반품", "교환", "return", "exchange"]) {
        return match order_number {
            Some(order_number) => Plan::Call(
                ToolId::InitiateReturn,
                json!({
                    "order_number": order_number,
                    "return_reason": request.trim(),
                    "items": "주문 상품 전체",
                }),
            ),
            None => Plan::Ask("반품하실 주문 번호를 알려주세요."),
        };
    }
    match order_number {
        Some(order_number) => {
            Plan::Call(ToolId::LookupOrderStatus, json!({ "order_number": order_number }))
        }
        None => Plan::Ask("주문 번호를 알려주시면 바로 확인해 드릴게요."),
    }
}

fn plan_technical(request: &str, recent: &str, ctx: &UserContext) -> Plan {
    let text = NormalizedText::new(recent);
    let current = NormalizedText::new(request);

    if any_of(&current, &["에스컬레이션", "엔지니어", "여전히", "아직도", "escalate", "engineer", "still"]) {
        let priority = if any_of(&current, &["긴급", "urgent", "critical"]) {
            "critical"
        } else if ctx.is_premium() {
            "high"
        } else {
            "medium"
        };
        return Plan::Call(
            ToolId::EscalateToEngineering,
            json!({ "issue_summary": recent.replace('\n', " / "), "priority": priority }),
        );
    }
    if any_of(&current, &["진단", "점검", "diagnose", "diagnostic", "check"]) {
        let product = if any_of(&text, &["웹", "web", "browser", "브라우저"]) { "웹사이트" } else { "앱" };
        return Plan::Call(
            ToolId::RunDiagnostic,
            json!({ "product_name": product, "issue_description": request.trim() }),
        );
    }

    let issue_type = if any_of(&text, &["로그인", "login", "sign in"]) {
        "login"
    } else if any_of(&text, &["충돌", "크래시", "꺼져", "멈춰", "crash", "freeze"]) {
        "crash"
    } else if any_of(&text, &["느려", "느림", "로딩", "slow", "performance", "lag"]) {
        "performance"
    } else if any_of(&text, &["접속", "연결", "인터넷", "connection", "network", "offline"]) {
        "connection"
    } else {
        "general"
    };
    Plan::Call(ToolId::ProvideTroubleshootingSteps, json!({ "issue_type": issue_type }))
}

fn ascii_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|character: char| !(character.is_ascii_alphanumeric() || character == '-'))
        .map(|token| token.trim_matches('-'))
        .filter(|token| !token.is_empty())
}

/// `12345`, `A-10023`, `ORD-5521`. Tracking numbers are not order numbers.
pub(crate) fn extract_order_number(text: &str) -> Option<String> {
    ascii_tokens(text)
        .filter(|token| !token.to_ascii_uppercase().starts_with("1Z"))
        .find(|token| token.chars().filter(char::is_ascii_digit).count() >= 4)
        .map(str::to_string)
}

pub(crate) fn extract_tracking_number(text: &str) -> Option<String> {
    ascii_tokens(text)
        .map(str::to_ascii_uppercase)
        .find(|token| {
            token.len() > 2
                && token.starts_with("1Z")
                && token[2..].chars().all(|c| c.is_ascii_digit())
        })
}

/// `$49.99`, `49.99달러`, `12,000원`, or a bare decimal like `49.99`.
pub(crate) fn extract_amount(text: &str) -> Option<Decimal> {
    let chars = text.char_indices().collect::<Vec<_>>();
    let mut index = 0;
    while index < chars.len() {
        let (start, character) = chars[index];
        if !character.is_ascii_digit() {
            index += 1;
            continue;
        }
        let mut end = index;
        while end < chars.len()
            && (chars[end].1.is_ascii_digit() || matches!(chars[end].1, '.' | ','))
        {
            end += 1;
        }
        let byte_end = chars.get(end).map(|(offset, _)| *offset).unwrap_or(text.len());
        let raw = text[start..byte_end].trim_end_matches(['.', ',']);
        let dollar_prefixed = index > 0 && chars[index - 1].1 == '$';
        let rest = text[byte_end..].trim_start();
        let unit_suffixed = rest.starts_with("달러")
            || rest.starts_with('원')
            || rest.starts_with("dollar")
            || rest.starts_with("usd");
        if dollar_prefixed || unit_suffixed || raw.contains('.') {
            if let Ok(amount) = Decimal::from_str(&raw.replace(',', "")) {
                if amount > Decimal::ZERO {
                    return Some(amount);
                }
            }
        }
        index = end;
    }
    None
}

pub(crate) fn extract_email(text: &str) -> Option<String> {
    text.split_whitespace()
        .filter(|word| word.contains('@'))
        .map(|word| {
            let ascii = word.chars().take_while(char::is_ascii).collect::<String>();
            ascii
                .trim_matches(|c: char| {
                    matches!(c, ',' | '.' | ';' | ':' | '(' | ')' | '<' | '>' | '"' | '\'')
                })
                .to_string()
        })
        .find(|candidate| crate::tools::looks_like_email(candidate))
}

fn extract_months(text: &str) -> Option<u32> {
    let lowered = text.to_lowercase();
    for unit in ["개월", " months", " month"] {
        if let Some(position) = lowered.find(unit) {
            let digits = lowered[..position]
                .chars()
                .rev()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .chars()
                .rev()
                .collect::<String>();
            if let Ok(months) = digits.parse() {
                return Some(months);
            }
        }
    }
    None
}

pub(crate) fn extract_date(text: &str) -> Option<String> {
    let today = Utc::now().date_naive();
    let lowered = text.to_lowercase();
    if lowered.contains("모레") {
        return Some((today + Duration::days(2)).format("%Y-%m-%d").to_string());
    }
    if lowered.contains("내일") || lowered.contains("tomorrow") {
        return Some((today + Duration::days(1)).format("%Y-%m-%d").to_string());
    }
    ascii_tokens(text)
        .find_map(|token| NaiveDate::parse_from_str(token, "%Y-%m-%d").ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
}

#[derive(Deserialize)]
struct ModelToolCall {
    tool: String,
    #[serde(default)]
    arguments: Value,
}

/// Drives a hosted model with the rendered prompt. The model answers either
/// with plain text for the customer or a single JSON tool call, which is run
/// and fed back.
pub struct ModelResponder {
    client: Arc<dyn LlmClient>,
    max_tool_rounds: u32,
}

impl ModelResponder {
    pub fn new(client: Arc<dyn LlmClient>, max_tool_rounds: u32) -> Self {
        Self { client, max_tool_rounds: max_tool_rounds.max(1) }
    }

    fn system_message(request: &SpecialistRequest<'_>) -> String {
        let tools = SpecialistProfile::of(request.specialist)
            .tool_subset()
            .iter()
            .map(|tool| format!("- {}", tool.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let mut system = format!(
            "{}\n\n사용 가능한 도구:\n{tools}\n\n도구가 필요하면 다음 형식의 JSON 한 개만 답하세요: {{\"tool\": \"도구 이름\", \"arguments\": {{...}}}}\n그렇지 않으면 고객에게 보낼 답변만 작성하세요.",
            request.prompt
        );
        if let Some(handoff) = request.handoff {
            system.push_str(&format!(
                "\n\n인계 정보: 유형={} / 내용={}",
                handoff.issue_type(),
                handoff.issue_description()
            ));
            if let Some(note) = handoff.priority_note() {
                system.push_str(&format!(" / {note}"));
            }
        }
        system
    }
}

fn parse_tool_call(answer: &str) -> Option<ModelToolCall> {
    let trimmed = answer.trim();
    let json = extract_json_object(trimmed)?;
    let call = serde_json::from_str::<ModelToolCall>(json).ok()?;
    (!call.tool.trim().is_empty()).then_some(call)
}

#[async_trait]
impl SpecialistResponder for ModelResponder {
    async fn respond(
        &self,
        request: SpecialistRequest<'_>,
        tools: &ToolCatalog,
    ) -> Result<Draft, ResponderError> {
        let mut messages = vec![ChatMessage::system(Self::system_message(&request))];
        messages.extend(request.history.iter().map(|turn| match turn.speaker {
            Speaker::User => ChatMessage::user(turn.content.clone()),
            Speaker::Assistant => ChatMessage::assistant(turn.content.clone()),
        }));
        messages.push(ChatMessage::user(request.request));

        let mut tool_calls = Vec::new();
        for round in 0..self.max_tool_rounds {
            let answer = self
                .client
                .complete(&messages)
                .await
                .map_err(|error| ResponderError::Model(error.to_string()))?;

            let Some(call) = parse_tool_call(&answer) else {
                return Ok(Draft { text: answer.trim().to_string(), tool_calls });
            };

            debug!(
                event_name = "responder.model.tool_call",
                specialist = %request.specialist,
                tool = %call.tool,
                round,
                "model requested tool"
            );
            let invocation = tools
                .invoke(request.specialist, &call.tool, request.ctx, call.arguments.clone())
                .await;
            messages.push(ChatMessage::assistant(answer));
            messages.push(ChatMessage::user(format!(
                "도구 결과 ({}):\n{}",
                invocation.tool, invocation.output
            )));
            tool_calls.push(ToolCallRecord {
                tool: invocation.tool,
                arguments: call.arguments,
                output: invocation.output,
                succeeded: invocation.succeeded,
            });
        }

        Err(ResponderError::ToolRoundsExhausted(self.max_tool_rounds))
    }
}
