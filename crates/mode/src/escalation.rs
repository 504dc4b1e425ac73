//! Keyword rule engine for escalation and coarse intent routing.

use serde::{Deserialize, Serialize};

/// Coarse intent classes used for routing, not content understanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Explicit request for a human operator.
    Transfer,
    /// Order or business operation.
    Order,
    /// Greeting / small talk.
    Chitchat,
    /// Everything else; routed to retrieval.
    Faq,
}

/// Configurable keyword sets driving escalation and intent routing.
///
/// Matching is plain substring containment over the trimmed message — the
/// rule engine is deliberately dumb; anything smarter belongs upstream in
/// the AI backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRules {
    /// Any hit forces AI → HUMAN.
    pub transfer_keywords: Vec<String>,
    pub order_keywords: Vec<String>,
    pub chitchat_keywords: Vec<String>,
}

impl Default for EscalationRules {
    fn default() -> Self {
        Self {
            transfer_keywords: keywords(&[
                "人工", "客服", "投诉", "转接", "电话", "经理", "human", "operator",
            ]),
            order_keywords: keywords(&[
                "价格", "多少钱", "租车", "预订", "库存", "订单", "续租", "退款",
            ]),
            chitchat_keywords: keywords(&["你好", "你是谁", "哈喽", "早上好", "晚安", "hello"]),
        }
    }
}

impl EscalationRules {
    /// Classify a message into a coarse intent. Transfer wins over order,
    /// order over chitchat; the default is FAQ.
    #[must_use]
    pub fn classify(&self, content: &str) -> Intent {
        let content = content.trim().to_lowercase();
        if hits(&content, &self.transfer_keywords) {
            Intent::Transfer
        } else if hits(&content, &self.order_keywords) {
            Intent::Order
        } else if hits(&content, &self.chitchat_keywords) {
            Intent::Chitchat
        } else {
            Intent::Faq
        }
    }

    /// Whether this message should force escalation to a human operator.
    #[must_use]
    pub fn is_escalation(&self, content: &str) -> bool {
        self.classify(content) == Intent::Transfer
    }
}

fn hits(content: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| content.contains(k.as_str()))
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| (*w).to_string()).collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_wins() {
        let rules = EscalationRules::default();
        assert_eq!(rules.classify("请转人工，我要退款"), Intent::Transfer);
        assert!(rules.is_escalation("给我转接客服"));
    }

    #[test]
    fn order_and_chitchat() {
        let rules = EscalationRules::default();
        assert_eq!(rules.classify("租车多少钱一天"), Intent::Order);
        assert_eq!(rules.classify("你好呀"), Intent::Chitchat);
    }

    #[test]
    fn default_is_faq() {
        let rules = EscalationRules::default();
        assert_eq!(rules.classify("押金什么时候退还"), Intent::Faq);
        assert!(!rules.is_escalation("押金什么时候退还"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let rules = EscalationRules::default();
        assert_eq!(rules.classify("HUMAN please"), Intent::Transfer);
    }
}
