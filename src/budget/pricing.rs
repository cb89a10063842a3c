//! Model pricing for cost calculation.
//!
//! Each model is priced per million input and output tokens. Prices can be
//! overridden via environment variables (`OVERSEER_PRICING_<FAMILY>_INPUT` /
//! `_OUTPUT`) or programmatically through the builder.

use std::collections::HashMap;
use std::sync::LazyLock;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: Decimal,
    pub output_per_mtok: Decimal,
}

impl ModelPricing {
    pub fn new(input_per_mtok: Decimal, output_per_mtok: Decimal) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    pub fn from_f64(input: f64, output: f64) -> Self {
        Self::new(
            Decimal::from_f64(input).unwrap_or_default(),
            Decimal::from_f64(output).unwrap_or_default(),
        )
    }

    /// Cost of a call given reported token counts.
    pub fn calculate(&self, tokens_in: u64, tokens_out: u64) -> Decimal {
        let mtok = Decimal::from(1_000_000u64);
        Decimal::from(tokens_in) / mtok * self.input_per_mtok
            + Decimal::from(tokens_out) / mtok * self.output_per_mtok
    }
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    default: ModelPricing,
}

impl PricingTable {
    pub fn builder() -> PricingTableBuilder {
        PricingTableBuilder::new()
    }

    pub fn get(&self, model: &str) -> &ModelPricing {
        let normalized = Self::normalize_model_name(model);
        self.models.get(&normalized).unwrap_or(&self.default)
    }

    pub fn calculate(&self, model: &str, tokens_in: u64, tokens_out: u64) -> Decimal {
        self.get(model).calculate(tokens_in, tokens_out)
    }

    /// Worst-case cost of a call: the whole prompt in, the configured
    /// output ceiling out. Used by the strict pre-dispatch budget check.
    pub fn project_max(&self, model: &str, est_tokens_in: u64, max_tokens_out: u64) -> Decimal {
        self.get(model).calculate(est_tokens_in, max_tokens_out)
    }

    fn normalize_model_name(model: &str) -> String {
        let model = model.to_lowercase();
        if model.contains("opus") {
            "opus".to_string()
        } else if model.contains("sonnet") {
            "sonnet".to_string()
        } else if model.contains("haiku") {
            "haiku".to_string()
        } else {
            model
        }
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        global_pricing_table().clone()
    }
}

#[derive(Debug, Default)]
pub struct PricingTableBuilder {
    models: HashMap<String, ModelPricing>,
    default: Option<ModelPricing>,
}

impl PricingTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(mut self) -> Self {
        self.models
            .insert("opus".into(), ModelPricing::from_f64(15.0, 75.0));
        self.models
            .insert("sonnet".into(), ModelPricing::from_f64(3.0, 15.0));
        self.models
            .insert("haiku".into(), ModelPricing::from_f64(0.80, 4.0));
        self
    }

    pub fn model(mut self, name: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(name.into(), pricing);
        self
    }

    pub fn default_pricing(mut self, pricing: ModelPricing) -> Self {
        self.default = Some(pricing);
        self
    }

    pub fn from_env(mut self) -> Self {
        self = self.with_defaults();

        for family in ["OPUS", "SONNET", "HAIKU"] {
            if let Some(pricing) = Self::parse_env_pricing(family) {
                self.models.insert(family.to_lowercase(), pricing);
            }
        }

        self
    }

    fn parse_env_pricing(family: &str) -> Option<ModelPricing> {
        let input = std::env::var(format!("OVERSEER_PRICING_{}_INPUT", family))
            .ok()?
            .parse::<f64>()
            .ok()?;
        let output = std::env::var(format!("OVERSEER_PRICING_{}_OUTPUT", family))
            .ok()?
            .parse::<f64>()
            .ok()?;
        Some(ModelPricing::from_f64(input, output))
    }

    pub fn build(self) -> PricingTable {
        let default = self
            .default
            .or_else(|| self.models.get("sonnet").copied())
            .unwrap_or(ModelPricing::from_f64(3.0, 15.0));

        PricingTable {
            models: self.models,
            default,
        }
    }
}

static GLOBAL_PRICING: LazyLock<PricingTable> =
    LazyLock::new(|| PricingTableBuilder::new().from_env().build());

pub fn global_pricing_table() -> &'static PricingTable {
    &GLOBAL_PRICING
}
