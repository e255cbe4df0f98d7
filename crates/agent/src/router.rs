//! Triage: keyword classification of a request into one specialist category,
//! with deferred routing while the customer is asked to clarify.
//!
//! The router is a pure function of the request, the customer, and the session
//! transcript. Pending clarification rounds are recovered from the clarification
//! turns stored in the transcript, so nothing survives between turns except the
//! session itself.

use std::fmt;

use thiserror::Error;

use supportdesk_core::domain::customer::UserContext;
use supportdesk_core::domain::handoff::HandoffRecord;
use supportdesk_core::domain::session::{Speaker, Turn, TurnKind};
use supportdesk_core::domain::specialist::{ActiveAgent, SpecialistId};

const ACCOUNT_KEYWORDS: &[&str] = &[
    "로그인",
    "비밀번호",
    "계정",
    "이메일",
    "2단계",
    "인증",
    "프로필",
    "탈퇴",
    "비활성화",
    "login",
    "log in",
    "sign in",
    "password",
    "account",
    "2fa",
    "two-factor",
    "profile",
    "deactivate",
];

const BILLING_KEYWORDS: &[&str] = &[
    "환불",
    "결제",
    "청구",
    "요금",
    "구독",
    "인보이스",
    "크레딧",
    "refund",
    "charge",
    "charged",
    "billing",
    "invoice",
    "payment",
    "subscription",
    "credit",
];

const ORDER_KEYWORDS: &[&str] = &[
    "주문",
    "배송",
    "반품",
    "교환",
    "운송장",
    "택배",
    "재배송",
    "order",
    "shipping",
    "shipment",
    "tracking",
    "delivery",
    "package",
    "return",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "오류",
    "에러",
    "버그",
    "충돌",
    "앱",
    "작동",
    "느려",
    "로딩",
    "설치",
    "크래시",
    "접속",
    "error",
    "crash",
    "bug",
    "slow",
    "install",
    "app",
    "not working",
    "connection",
];

pub fn keywords_for(category: SpecialistId) -> &'static [&'static str] {
    match category {
        SpecialistId::Account => ACCOUNT_KEYWORDS,
        SpecialistId::Billing => BILLING_KEYWORDS,
        SpecialistId::Order => ORDER_KEYWORDS,
        SpecialistId::Technical => TECHNICAL_KEYWORDS,
    }
}

/// Lowercased text plus its ASCII word tokens.
///
/// Single ASCII words only match whole tokens, so `app` does not fire inside
/// `happy`. Hangul and multi-word keywords match as substrings since Korean
/// particles attach directly to the noun.
pub(crate) struct NormalizedText {
    lowered: String,
    tokens: Vec<String>,
}

impl NormalizedText {
    pub(crate) fn new(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|character: char| !(character.is_ascii_alphanumeric() || character == '-'))
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        Self { lowered, tokens }
    }

    pub(crate) fn contains(&self, keyword: &str) -> bool {
        let single_ascii_word =
            keyword.is_ascii() && !keyword.contains(' ') && !keyword.contains('-');
        if single_ascii_word {
            self.tokens.iter().any(|token| token == keyword)
        } else {
            self.lowered.contains(keyword)
        }
    }

    pub(crate) fn matches<'k>(&self, keywords: &[&'k str]) -> Vec<&'k str> {
        keywords.iter().copied().filter(|keyword| self.contains(keyword)).collect()
    }
}

/// Distinct keyword hits per category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryScores {
    hits: Vec<(SpecialistId, Vec<&'static str>)>,
}

impl CategoryScores {
    pub fn score(text: &str) -> Self {
        let normalized = NormalizedText::new(text);
        let hits = SpecialistId::ALL
            .iter()
            .map(|category| (*category, normalized.matches(keywords_for(*category))))
            .collect();
        Self { hits }
    }

    pub fn score_of(&self, category: SpecialistId) -> usize {
        self.matched(category).len()
    }

    pub fn matched(&self, category: SpecialistId) -> &[&'static str] {
        self.hits
            .iter()
            .find(|(candidate, _)| *candidate == category)
            .map(|(_, matched)| matched.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_signal(&self) -> bool {
        self.hits.iter().any(|(_, matched)| !matched.is_empty())
    }

    /// Categories sharing the top score, in triage listing order. Empty when
    /// nothing matched.
    pub fn leaders(&self) -> Vec<SpecialistId> {
        let top = self.hits.iter().map(|(_, matched)| matched.len()).max().unwrap_or(0);
        if top == 0 {
            return Vec::new();
        }
        self.hits
            .iter()
            .filter(|(_, matched)| matched.len() == top)
            .map(|(category, _)| *category)
            .collect()
    }

    /// The single top category, if there is one.
    pub fn confident(&self) -> Option<SpecialistId> {
        match self.leaders().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriageState {
    AwaitingInput,
    Classifying,
    AwaitingClarification,
    Routed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriageEvent {
    RequestArrived,
    Ambiguous,
    Clarified,
    Confident,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("illegal triage transition from {from:?} on {event:?}")]
pub struct TransitionError {
    pub from: TriageState,
    pub event: TriageEvent,
}

impl TriageState {
    pub fn transition(self, event: TriageEvent) -> Result<Self, TransitionError> {
        match (self, event) {
            (Self::AwaitingInput, TriageEvent::RequestArrived) => Ok(Self::Classifying),
            (Self::Classifying, TriageEvent::Ambiguous) => Ok(Self::AwaitingClarification),
            (Self::AwaitingClarification, TriageEvent::Clarified) => Ok(Self::Classifying),
            (Self::Classifying, TriageEvent::Confident) => Ok(Self::Routed),
            (from, event) => Err(TransitionError { from, event }),
        }
    }
}

/// Clarification rounds already spent on the current request, recovered from
/// the tail of the transcript.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingClarification {
    pub rounds: u32,
    pub user_messages: Vec<String>,
}

impl PendingClarification {
    pub fn from_history(turns: &[Turn]) -> Self {
        let mut pending = Self::default();
        let mut cursor = turns.len();

        while cursor >= 2 {
            let question = &turns[cursor - 1];
            let asked = &turns[cursor - 2];
            let is_round = question.kind == TurnKind::Clarification
                && asked.speaker == Speaker::User
                && asked.kind == TurnKind::Message;
            if !is_round {
                break;
            }
            pending.rounds += 1;
            pending.user_messages.insert(0, asked.content.clone());
            cursor -= 2;
        }

        pending
    }

    pub fn is_pending(&self) -> bool {
        self.rounds > 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    /// Committed classification; the session moves to this specialist.
    Handoff(HandoffRecord),
    /// Sticky routing: the active specialist keeps the conversation.
    Stay(SpecialistId),
    /// Routing deferred until the customer answers `question`.
    Clarify { question: String, round: u32 },
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handoff(record) => write!(f, "handoff:{}", record.to_specialist()),
            Self::Stay(specialist) => write!(f, "stay:{specialist}"),
            Self::Clarify { round, .. } => write!(f, "clarify:{round}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Router {
    max_clarifications: u32,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Router {
    pub fn new(max_clarifications: u32) -> Self {
        Self { max_clarifications }
    }

    pub fn max_clarifications(&self) -> u32 {
        self.max_clarifications
    }

    pub fn route(
        &self,
        request: &str,
        ctx: &UserContext,
        history: &[Turn],
        active_agent: ActiveAgent,
        correlation_id: &str,
    ) -> Result<RouteDecision, TransitionError> {
        let pending = PendingClarification::from_history(history);
        let mut state = if pending.is_pending() {
            TriageState::AwaitingClarification.transition(TriageEvent::Clarified)?
        } else {
            TriageState::AwaitingInput.transition(TriageEvent::RequestArrived)?
        };

        let text = if pending.is_pending() {
            let mut parts = pending.user_messages.clone();
            parts.push(request.to_string());
            parts.join("\n")
        } else {
            request.to_string()
        };
        let scores = CategoryScores::score(&text);

        if let (Some(current), false) = (active_agent.specialist(), pending.is_pending()) {
            return match scores.confident() {
                Some(next) if next != current => {
                    state.transition(TriageEvent::Confident)?;
                    Ok(RouteDecision::Handoff(build_handoff(
                        next,
                        &scores,
                        &text,
                        ctx,
                        correlation_id,
                        format!("topic changed from {current} to {next}"),
                    )))
                }
                _ => Ok(RouteDecision::Stay(current)),
            };
        }

        let leaders = scores.leaders();
        let chosen = match leaders.as_slice() {
            [only] => Some((*only, format!("matched {} keywords", only))),
            [first, ..] if pending.rounds >= self.max_clarifications => Some((
                *first,
                format!("tie resolved in listing order after {} clarifications", pending.rounds),
            )),
            _ => None,
        };

        match chosen {
            Some((category, reason)) => {
                state = state.transition(TriageEvent::Confident)?;
                debug_assert_eq!(state, TriageState::Routed);
                Ok(RouteDecision::Handoff(build_handoff(
                    category,
                    &scores,
                    &text,
                    ctx,
                    correlation_id,
                    reason,
                )))
            }
            None => {
                state.transition(TriageEvent::Ambiguous)?;
                Ok(RouteDecision::Clarify {
                    question: clarifying_question(ctx, &leaders),
                    round: pending.rounds + 1,
                })
            }
        }
    }
}

fn build_handoff(
    category: SpecialistId,
    scores: &CategoryScores,
    text: &str,
    ctx: &UserContext,
    correlation_id: &str,
    reason: String,
) -> HandoffRecord {
    let matched = scores.matched(category);
    let issue_type = matched.first().copied().unwrap_or(category.as_str());
    let reason = if matched.is_empty() {
        reason
    } else {
        format!("{reason} ({})", matched.join(", "))
    };

    let record = HandoffRecord::new(category, reason, issue_type, text.trim(), correlation_id);
    if ctx.is_premium() {
        record.with_priority_note(format!("{} 고객: 우선 처리 대상", ctx.tier()))
    } else {
        record
    }
}

pub fn category_label(category: SpecialistId) -> &'static str {
    match category {
        SpecialistId::Account => "계정 관리",
        SpecialistId::Billing => "결제 지원",
        SpecialistId::Order => "주문 관리",
        SpecialistId::Technical => "기술 지원",
    }
}

fn clarifying_question(ctx: &UserContext, leaders: &[SpecialistId]) -> String {
    match leaders {
        [] => format!(
            "{} 님, 안녕하세요! 계정, 결제, 주문, 기술 지원 중 어떤 도움이 필요하신가요? 조금 더 자세히 말씀해 주세요.",
            ctx.name()
        ),
        _ => {
            let options =
                leaders.iter().map(|category| category_label(*category)).collect::<Vec<_>>();
            format!(
                "{} 님, 문의하신 내용이 {} 중 어느 쪽에 더 가까운가요? 가장 급한 문제를 먼저 알려주세요.",
                ctx.name(),
                options.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use supportdesk_core::domain::customer::{Tier, UserContext};
    use supportdesk_core::domain::session::Turn;
    use supportdesk_core::domain::specialist::{ActiveAgent, SpecialistId};

    use super::{
        CategoryScores, PendingClarification, RouteDecision, Router, TriageEvent, TriageState,
    };

    fn basic_ctx() -> UserContext {
        UserContext::new("1", "nana", "ktra@example.com", Tier::Basic)
    }

    fn handoff_target(decision: &RouteDecision) -> Option<SpecialistId> {
        match decision {
            RouteDecision::Handoff(record) => Some(record.to_specialist()),
            _ => None,
        }
    }

    #[test]
    fn korean_exemplars_route_to_their_category() {
        let router = Router::default();
        let ctx = basic_ctx();
        let cases = [
            ("로그인이 안 돼요", SpecialistId::Account),
            ("환불이 필요해요", SpecialistId::Billing),
            ("주문은 어디 있나요", SpecialistId::Order),
            ("오류가 떠요", SpecialistId::Technical),
        ];

        for (request, expected) in cases {
            let decision =
                router.route(request, &ctx, &[], ActiveAgent::Triage, "corr").expect("route");
            assert_eq!(handoff_target(&decision), Some(expected), "request `{request}`");
        }
    }

    #[test]
    fn ascii_keywords_match_whole_words_only() {
        let scores = CategoryScores::score("I am happy with the approach");
        assert_eq!(scores.score_of(SpecialistId::Technical), 0);
        assert!(!scores.has_signal());

        let scores = CategoryScores::score("The app shows an error");
        assert_eq!(scores.score_of(SpecialistId::Technical), 2);
    }

    #[test]
    fn tier_never_changes_the_category() {
        let router = Router::default();
        let premium = UserContext::new("2", "mina", "mina@example.com", Tier::Enterprise);

        let basic_decision = router
            .route("결제가 두 번 됐어요", &basic_ctx(), &[], ActiveAgent::Triage, "c1")
            .expect("route");
        let premium_decision = router
            .route("결제가 두 번 됐어요", &premium, &[], ActiveAgent::Triage, "c2")
            .expect("route");

        assert_eq!(handoff_target(&basic_decision), handoff_target(&premium_decision));
        match premium_decision {
            RouteDecision::Handoff(record) => {
                assert_eq!(record.priority_note(), Some("enterprise 고객: 우선 처리 대상"));
            }
            other => panic!("expected handoff, got {other:?}"),
        }
        match basic_decision {
            RouteDecision::Handoff(record) => assert_eq!(record.priority_note(), None),
            other => panic!("expected handoff, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_request_defers_then_resolves_after_clarification() {
        let router = Router::new(2);
        let ctx = basic_ctx();
        let request = "결제 오류가 있어요";

        let first = router.route(request, &ctx, &[], ActiveAgent::Triage, "c").expect("route");
        let question = match first {
            RouteDecision::Clarify { question, round } => {
                assert_eq!(round, 1);
                question
            }
            other => panic!("expected clarification, got {other:?}"),
        };
        assert!(question.contains("nana"));

        let history = vec![Turn::user(request), Turn::clarification(question)];
        let second = router.route("앱에서 결제 화면이 안 떠요", &ctx, &history, ActiveAgent::Triage, "c");
        assert_eq!(handoff_target(&second.expect("route")), Some(SpecialistId::Technical));
    }

    #[test]
    fn persistent_tie_resolves_in_listing_order_after_max_rounds() {
        let router = Router::new(2);
        let ctx = basic_ctx();
        let history = vec![
            Turn::user("결제 오류"),
            Turn::clarification("어느 쪽인가요?"),
            Turn::user("음"),
            Turn::clarification("조금 더 알려주세요"),
        ];

        let decision =
            router.route("잘 모르겠어요", &ctx, &history, ActiveAgent::Triage, "c").expect("route");
        assert_eq!(handoff_target(&decision), Some(SpecialistId::Technical));
    }

    #[test]
    fn no_signal_keeps_deferring() {
        let router = Router::new(1);
        let ctx = basic_ctx();
        let history = vec![Turn::user("안녕하세요"), Turn::clarification("무엇을 도와드릴까요?")];

        let decision =
            router.route("그냥요", &ctx, &history, ActiveAgent::Triage, "c").expect("route");
        assert!(matches!(decision, RouteDecision::Clarify { round: 2, .. }));
    }

    #[test]
    fn active_specialist_keeps_follow_ups_without_a_new_signal() {
        let router = Router::default();
        let ctx = basic_ctx();
        let active = ActiveAgent::Specialist(SpecialistId::Order);

        let follow_up = router.route("12345번이에요", &ctx, &[], active, "c").expect("route");
        assert_eq!(follow_up, RouteDecision::Stay(SpecialistId::Order));

        let same_topic = router.route("배송 추적도 부탁해요", &ctx, &[], active, "c").expect("route");
        assert_eq!(same_topic, RouteDecision::Stay(SpecialistId::Order));

        let switched = router.route("환불도 받고 싶어요", &ctx, &[], active, "c").expect("route");
        assert_eq!(handoff_target(&switched), Some(SpecialistId::Billing));
    }

    #[test]
    fn pending_rounds_are_recovered_from_trailing_clarifications() {
        let history = vec![
            Turn::user("안녕"),
            Turn::assistant(SpecialistId::Order, "배송 완료"),
            Turn::user("문제가 있어요"),
            Turn::clarification("어떤 문제인가요?"),
        ];
        let pending = PendingClarification::from_history(&history);
        assert_eq!(pending.rounds, 1);
        assert_eq!(pending.user_messages, vec!["문제가 있어요".to_string()]);

        assert!(!PendingClarification::from_history(&history[..2]).is_pending());
    }

    #[test]
    fn state_machine_rejects_illegal_transitions() {
        assert_eq!(
            TriageState::AwaitingInput.transition(TriageEvent::RequestArrived),
            Ok(TriageState::Classifying)
        );
        assert!(TriageState::Routed.transition(TriageEvent::Ambiguous).is_err());
        assert!(TriageState::AwaitingInput.transition(TriageEvent::Confident).is_err());
    }
}
