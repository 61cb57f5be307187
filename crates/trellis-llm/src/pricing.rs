//! Per-model pricing, in USD per 1000 tokens.
//!
//! Local models cost nothing; unknown remote models fall back to zero so a
//! missing table entry never blocks a call, it just under-reports.

use trellis_core::traits::TokenUsage;

/// (input per 1k, output per 1k)
fn rates(model: &str) -> (f64, f64) {
    match model {
        "gpt-4" => (0.03, 0.06),
        "gpt-4-turbo" => (0.01, 0.03),
        "gpt-4o" => (0.005, 0.015),
        "gpt-4o-mini" => (0.000_15, 0.000_6),
        "gpt-3.5-turbo" => (0.001_5, 0.002),
        "claude-3-opus-20240229" => (0.015, 0.075),
        "claude-3-sonnet-20240229" => (0.003, 0.015),
        "claude-3-haiku-20240307" => (0.000_25, 0.001_25),
        _ => (0.0, 0.0),
    }
}

/// Cost of one call, rounded to 6 decimal places.
///
/// `is_local` short-circuits to zero regardless of the model name, so a
/// local deployment of a known remote model is never billed.
pub fn estimate_cost(model: &str, usage: &TokenUsage, is_local: bool) -> f64 {
    if is_local {
        return 0.0;
    }
    let (input_rate, output_rate) = rates(model);
    let cost = usage.prompt_tokens as f64 / 1000.0 * input_rate
        + usage.completion_tokens as f64 / 1000.0 * output_rate;
    (cost * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u64, completion: u64) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn gpt4_pricing() {
        let cost = estimate_cost("gpt-4", &usage(1000, 500), false);
        assert!((cost - 0.06).abs() < 1e-9);
    }

    #[test]
    fn local_models_are_free() {
        assert_eq!(estimate_cost("llama2", &usage(5000, 5000), true), 0.0);
        assert_eq!(estimate_cost("gpt-4", &usage(1000, 1000), true), 0.0);
    }

    #[test]
    fn unknown_remote_model_costs_zero() {
        assert_eq!(estimate_cost("some-new-model", &usage(1000, 1000), false), 0.0);
    }

    #[test]
    fn cost_is_rounded_to_six_places() {
        let cost = estimate_cost("gpt-4o-mini", &usage(7, 3), false);
        assert_eq!(cost, (cost * 1_000_000.0).round() / 1_000_000.0);
    }
}
