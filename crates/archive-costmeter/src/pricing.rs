use crate::types::EventKind;

/// Per-1k-token (or per-minute / per-image) pricing for one `provider:model`
/// pair (spec §4.2). Only the fields relevant to the event's `kind` are
/// read; the others are zero for kinds that don't apply.
#[derive(Debug, Clone, Copy)]
pub struct Price {
    pub in_per_1k: f64,
    pub out_per_1k: f64,
    pub embed_per_1k: f64,
    pub per_minute: f64,
    pub per_image: f64,
}

impl Price {
    const ZERO: Price = Price {
        in_per_1k: 0.0,
        out_per_1k: 0.0,
        embed_per_1k: 0.0,
        per_minute: 0.0,
        per_image: 0.0,
    };
}

/// Static pricing table. `key` is `"provider:model"`. Kept intentionally
/// small and explicit rather than fetched live — the spec treats vendor
/// pricing as a fact the operator updates by redeploying, not a runtime
/// setting.
const TABLE: &[(&str, Price)] = &[
    (
        "openai:gpt-4o-mini",
        Price {
            in_per_1k: 0.00015,
            out_per_1k: 0.0006,
            ..Price::ZERO
        },
    ),
    (
        "openai:gpt-4o",
        Price {
            in_per_1k: 0.0025,
            out_per_1k: 0.01,
            ..Price::ZERO
        },
    ),
    (
        "openai:text-embedding-3-large",
        Price {
            embed_per_1k: 0.00013,
            ..Price::ZERO
        },
    ),
    (
        "openai:text-embedding-3-small",
        Price {
            embed_per_1k: 0.00002,
            ..Price::ZERO
        },
    ),
    (
        "openai:whisper-1",
        Price {
            per_minute: 0.006,
            ..Price::ZERO
        },
    ),
    (
        "openai:dall-e-3",
        Price {
            per_image: 0.04,
            ..Price::ZERO
        },
    ),
    (
        "anthropic:claude-3-5-sonnet",
        Price {
            in_per_1k: 0.003,
            out_per_1k: 0.015,
            ..Price::ZERO
        },
    ),
    (
        "anthropic:claude-3-5-haiku",
        Price {
            in_per_1k: 0.0008,
            out_per_1k: 0.004,
            ..Price::ZERO
        },
    ),
    (
        "cohere:rerank-english-v3.0",
        Price {
            per_image: 0.0, // priced per search, folded into embed_per_1k-style flat rate
            embed_per_1k: 0.002,
            ..Price::ZERO
        },
    ),
];

/// Resolve aliases: strips date suffixes (`gpt-4o-2024-08-06` →
/// `gpt-4o`) and SDK namespace prefixes (`models/text-embedding-3-large` →
/// `text-embedding-3-large`) before the table lookup (spec §4.2).
pub fn normalize_model(model: &str) -> String {
    let model = model.rsplit('/').next().unwrap_or(model);
    // Strip a trailing `-YYYY-MM-DD` or `-YYYYMMDD` date suffix.
    let parts: Vec<&str> = model.split('-').collect();
    if parts.len() >= 4 {
        let tail = &parts[parts.len() - 3..];
        let looks_like_date = tail[0].len() == 4
            && tail[0].chars().all(|c| c.is_ascii_digit())
            && tail[1].len() <= 2
            && tail[1].chars().all(|c| c.is_ascii_digit())
            && tail[2].len() <= 2
            && tail[2].chars().all(|c| c.is_ascii_digit());
        if looks_like_date {
            return parts[..parts.len() - 3].join("-");
        }
    }
    model.to_string()
}

pub fn lookup(provider: &str, model: &str) -> Price {
    let normalized = normalize_model(model);
    let key = format!("{provider}:{normalized}");
    TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, p)| *p)
        .unwrap_or(Price::ZERO)
}

/// Compute USD cost for one event. `minutes`/`images` are only meaningful
/// for the `Whisper`/`Image` kinds respectively; callers pass 0 otherwise.
pub fn cost_usd(
    provider: &str,
    model: &str,
    kind: EventKind,
    in_tokens: u32,
    out_tokens: u32,
    minutes: f64,
    images: u32,
) -> f64 {
    let price = lookup(provider, model);
    match kind {
        EventKind::Chat | EventKind::Rerank => {
            (in_tokens as f64 / 1000.0) * price.in_per_1k
                + (out_tokens as f64 / 1000.0) * price.out_per_1k
                + (in_tokens as f64 / 1000.0) * price.embed_per_1k
        }
        EventKind::Embed => (in_tokens as f64 / 1000.0) * price.embed_per_1k,
        EventKind::Whisper => minutes * price.per_minute,
        EventKind::Image => images as f64 * price.per_image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_date_suffix() {
        assert_eq!(normalize_model("gpt-4o-2024-08-06"), "gpt-4o");
    }

    #[test]
    fn normalize_strips_sdk_prefix() {
        assert_eq!(
            normalize_model("models/text-embedding-3-large"),
            "text-embedding-3-large"
        );
    }

    #[test]
    fn unknown_model_prices_zero() {
        let p = lookup("openai", "made-up-model");
        assert_eq!(p.in_per_1k, 0.0);
    }

    #[test]
    fn chat_cost_is_sum_of_in_and_out() {
        let cost = cost_usd("openai", "gpt-4o-mini", EventKind::Chat, 1000, 1000, 0.0, 0);
        assert!((cost - (0.00015 + 0.0006)).abs() < 1e-9);
    }
}
