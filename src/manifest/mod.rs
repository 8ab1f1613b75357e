// src/manifest/mod.rs

mod strategies;

use crate::config::ParserSection;
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, info_span};

/// The closed set of layout patterns the parser knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// `00063 - PRODUCT NAME KG 100,5`
    Header,
    /// `40 45 50,0 123456789012345`, optionally prefixed by `00063 /`
    DetailLine,
    /// `PRODUTO: 00063 LOTE: 123456789012345 FORMATO: 40 GRAMATURA: 45 PESO: 50,0`
    LabeledLot,
    /// Proximity search around configured product names/codes.
    Catalog,
}

impl ExtractionStrategy {
    pub const ALL: [Self; 4] = [
        Self::Header,
        Self::DetailLine,
        Self::LabeledLot,
        Self::Catalog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::DetailLine => "detail_line",
            Self::LabeledLot => "labeled_lot",
            Self::Catalog => "catalog",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    #[default]
    Pending,
    Matched,
}

/// A single physical unit listed on the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotRecord {
    pub lot_identifier: String,
    pub product_code: String,
    pub product_name: String,
    /// Layout-specific fields (`format`, `basis-weight`, `unit-weight`, ...), verbatim.
    pub attributes: BTreeMap<String, String>,
    pub status: LotStatus,
    /// Which strategy produced this record. Debug only.
    pub strategy: ExtractionStrategy,
}

/// All lots of one product, in manifest order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductGroup {
    pub product_code: String,
    pub product_name: String,
    /// Declared total, kept exactly as printed (`100,5`, `1.250,00`).
    pub total_weight: Option<String>,
    pub lots: Vec<LotRecord>,
}

impl ProductGroup {
    /// Numeric total for callers that need one; never used for matching.
    pub fn total_weight_value(&self) -> Option<f64> {
        self.total_weight.as_deref().and_then(decimal_value)
    }
}

/// Convert a manifest numeral to `f64` with a single comma-to-dot substitution.
pub fn decimal_value(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse::<f64>().ok()
}

/// A known product the catalog fallback searches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Candidate shape shared by every strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ProductRef {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LotCandidate {
    pub identifier: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    /// Byte offset of the match in the normalized text.
    pub offset: usize,
    pub strategy: ExtractionStrategy,
    /// `None` means "belongs to the closest product declared before it".
    pub product: Option<ProductRef>,
    pub total_weight: Option<String>,
    pub lot: Option<LotCandidate>,
}

impl Candidate {
    fn is_anchor(&self) -> bool {
        self.lot.is_none() && self.product.is_some()
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ManifestParser {
    strategies: Vec<ExtractionStrategy>,
    catalog: Vec<CatalogEntry>,
    catalog_window: usize,
}

impl Default for ManifestParser {
    fn default() -> Self {
        Self::from_config(&ParserSection::default())
    }
}

impl ManifestParser {
    pub fn from_config(section: &ParserSection) -> Self {
        Self {
            strategies: section.strategies.clone(),
            catalog: section.catalog.clone(),
            catalog_window: section.catalog_window,
        }
    }

    pub fn with_catalog(mut self, catalog: Vec<CatalogEntry>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Run every enabled strategy over `text` and merge the results by product.
    ///
    /// The catalog strategy is a fallback: it only runs when none of the
    /// generic strategies produced a lot.
    pub fn parse(&self, text: &str) -> Result<Vec<ProductGroup>, ParseError> {
        let span = info_span!("parse_manifest", chars = text.len());
        let _guard = span.enter();

        let mut candidates = Vec::new();
        for strategy in &self.strategies {
            if *strategy == ExtractionStrategy::Catalog {
                continue;
            }
            let found = strategies::run(*strategy, text);
            debug!(strategy = strategy.as_str(), candidates = found.len(), "Strategy pass");
            candidates.extend(found);
        }
        retain_usable(&mut candidates);

        let has_lots = candidates.iter().any(|c| c.lot.is_some());
        if !has_lots && self.strategies.contains(&ExtractionStrategy::Catalog) {
            let mut found = strategies::catalog(text, &self.catalog, self.catalog_window);
            retain_usable(&mut found);
            info!(
                entries = self.catalog.len(),
                candidates = found.len(),
                "Generic patterns found no lots, using catalog fallback"
            );
            candidates.extend(found);
        }

        let groups = merge(candidates);
        if groups.is_empty() {
            info!("No manifest records found");
            return Err(ParseError::NoRecordsFound);
        }

        for group in &groups {
            info!(
                code = %group.product_code,
                name = %group.product_name,
                total = ?group.total_weight,
                lots = group.lots.len(),
                "Product group"
            );
            for lot in &group.lots {
                debug!(lot = %lot.lot_identifier, strategy = lot.strategy.as_str(), "Lot record");
            }
        }
        Ok(groups)
    }
}

/// Parse with the default strategy order and an empty catalog.
pub fn parse(text: &str) -> Result<Vec<ProductGroup>, ParseError> {
    ManifestParser::default().parse(text)
}

fn retain_usable(candidates: &mut Vec<Candidate>) {
    candidates.retain(|c| match &c.lot {
        Some(lot) if lot.identifier.trim().is_empty() => {
            debug!(offset = c.offset, strategy = c.strategy.as_str(), "Skipping lot with empty identifier");
            false
        }
        _ => true,
    });
}

fn canonical_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Product identity: code when both sides have one, otherwise normalized name.
fn same_product(group: &ProductGroup, product: &ProductRef) -> bool {
    if !group.product_code.is_empty() && !product.code.is_empty() {
        return group.product_code == product.code;
    }
    let group_name = canonical_name(&group.product_name);
    let name = canonical_name(&product.name);
    if group.product_code.is_empty() && product.code.is_empty() {
        group_name == name
    } else {
        !name.is_empty() && group_name == name
    }
}

fn find_or_open(groups: &mut Vec<ProductGroup>, product: &ProductRef) -> usize {
    if let Some(idx) = groups.iter().position(|g| same_product(g, product)) {
        let group = &mut groups[idx];
        if group.product_code.is_empty() {
            group.product_code = product.code.clone();
        }
        if group.product_name.is_empty() {
            group.product_name = product.name.trim().to_string();
        }
        return idx;
    }
    groups.push(ProductGroup {
        product_code: product.code.clone(),
        product_name: product.name.trim().to_string(),
        total_weight: None,
        lots: Vec::new(),
    });
    groups.len() - 1
}

/// Fold candidates into groups. Group order follows first appearance,
/// lot order follows candidate order.
fn merge(candidates: Vec<Candidate>) -> Vec<ProductGroup> {
    let mut anchors: Vec<(usize, ProductRef)> = candidates
        .iter()
        .filter(|c| c.is_anchor())
        .filter_map(|c| c.product.clone().map(|p| (c.offset, p)))
        .collect();
    anchors.sort_by_key(|(offset, _)| *offset);

    let mut groups: Vec<ProductGroup> = Vec::new();
    for candidate in candidates {
        let product = match candidate.product {
            Some(p) => p,
            None => anchors
                .iter()
                .take_while(|(offset, _)| *offset < candidate.offset)
                .last()
                .map(|(_, p)| p.clone())
                .unwrap_or_default(),
        };

        let idx = find_or_open(&mut groups, &product);
        let group = &mut groups[idx];
        if group.total_weight.is_none() {
            group.total_weight = candidate.total_weight;
        }
        if let Some(lot) = candidate.lot {
            group.lots.push(LotRecord {
                lot_identifier: lot.identifier,
                product_code: String::new(),
                product_name: String::new(),
                attributes: lot.attributes,
                status: LotStatus::Pending,
                strategy: candidate.strategy,
            });
        }
    }

    groups.retain(|g| !g.lots.is_empty());
    for group in &mut groups {
        for lot in &mut group.lots {
            lot.product_code = group.product_code.clone();
            lot.product_name = group.product_name.clone();
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_A: &str = "00063 - PRODUCT X KG 100,5 40 45 50,0 123456789012345";

    fn lot_ids(group: &ProductGroup) -> Vec<&str> {
        group.lots.iter().map(|l| l.lot_identifier.as_str()).collect()
    }

    #[test]
    fn test_header_and_detail() {
        let groups = parse(SCENARIO_A).unwrap();
        assert_eq!(groups.len(), 1);
        let g = &groups[0];
        assert_eq!(g.product_code, "00063");
        assert_eq!(g.product_name, "PRODUCT X");
        assert_eq!(g.total_weight.as_deref(), Some("100,5"));
        assert_eq!(lot_ids(g), vec!["123456789012345"]);

        let lot = &g.lots[0];
        assert_eq!(lot.status, LotStatus::Pending);
        assert_eq!(lot.product_name, "PRODUCT X");
        assert_eq!(lot.attributes["format"], "40");
        assert_eq!(lot.attributes["basis-weight"], "45");
        assert_eq!(lot.attributes["unit-weight"], "50,0");
        assert_eq!(lot.strategy, ExtractionStrategy::DetailLine);
    }

    #[test]
    fn test_empty_text_has_no_records() {
        assert_eq!(parse(""), Err(ParseError::NoRecordsFound));
    }

    #[test]
    fn test_noise_has_no_records() {
        let text = "ROMANEIO DE CARGA\nTRANSPORTADORA ACME PLACA ABC-1234 DATA 12/03/2024";
        assert_eq!(parse(text), Err(ParseError::NoRecordsFound));
    }

    #[test]
    fn test_header_without_lots_is_dropped() {
        let text = "00063 - PRODUCT X KG 100,5\n00071 - PRODUCT Y KG 20,0 40 45 50,0 998877665544";
        let groups = parse(text).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].product_name, "PRODUCT Y");
    }

    #[test]
    fn test_details_attach_to_closest_preceding_header() {
        let text = "00063 - KRAFT LINER KG 1.250,00 40 45 50,0 111111111111 40 45 51,5 111111111112 \
                    00071 - MIOLO 120 KG 300,5 60 120 75,1 222222222222";
        let groups = parse(text).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].product_name, "KRAFT LINER");
        assert_eq!(groups[0].total_weight.as_deref(), Some("1.250,00"));
        assert_eq!(lot_ids(&groups[0]), vec!["111111111111", "111111111112"]);
        assert_eq!(groups[1].product_name, "MIOLO 120");
        assert_eq!(lot_ids(&groups[1]), vec!["222222222222"]);
    }

    #[test]
    fn test_explicit_product_link_wins_over_position() {
        let text = "00063 - KRAFT LINER KG 10,0\n00071 - MIOLO 120 KG 20,0\n\
                    00063 / 40 45 50,0 333333333333 60 120 75,1 444444444444";
        let groups = parse(text).unwrap();
        assert_eq!(lot_ids(&groups[0]), vec!["333333333333"]);
        assert_eq!(lot_ids(&groups[1]), vec!["444444444444"]);
    }

    #[test]
    fn test_lots_before_any_header_are_kept() {
        let text = "40 45 50,0 555555555555\n00063 - KRAFT LINER KG 10,0 40 45 50,0 666666666666";
        let groups = parse(text).unwrap();
        assert_eq!(groups.len(), 2);
        // header candidates are folded first, so the named group leads
        assert_eq!(lot_ids(&groups[0]), vec!["666666666666"]);
        assert_eq!(groups[1].product_code, "");
        assert_eq!(groups[1].product_name, "");
        assert_eq!(lot_ids(&groups[1]), vec!["555555555555"]);
    }

    #[test]
    fn test_labeled_lots_merge_into_header_group() {
        let text = "00063 - KRAFT LINER KG 100,5 40 45 50,0 123456789012345\n\
                    PRODUTO: 00063 LOTE: 777777777777 FORMATO: 80 GRAMATURA: 45 PESO: 49,5";
        let groups = parse(text).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(lot_ids(&groups[0]), vec!["123456789012345", "777777777777"]);
        let labeled = &groups[0].lots[1];
        assert_eq!(labeled.strategy, ExtractionStrategy::LabeledLot);
        assert_eq!(labeled.attributes["format"], "80");
        assert_eq!(labeled.attributes["unit-weight"], "49,5");
    }

    #[test]
    fn test_product_label_covers_every_lot_after_it() {
        let text = "PRODUTO: 00063 LOTE: 111111111111 FORMATO: 40 LOTE: 111111111112 FORMATO: 40";
        let groups = parse(text).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].product_code, "00063");
        assert_eq!(lot_ids(&groups[0]), vec!["111111111111", "111111111112"]);
        assert!(groups[0].lots.iter().all(|l| l.product_code == "00063"));
    }

    #[test]
    fn test_detail_line_after_product_label_joins_that_group() {
        let text = "PRODUTO: 00071 LOTE: 222222222222 PESO: 5,0\n40 45 50,0 333333333333";
        let groups = parse(text).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].product_code, "00071");
        // strategy order first: the detail line is folded before the labeled lot
        assert_eq!(lot_ids(&groups[0]), vec!["333333333333", "222222222222"]);
        assert_eq!(groups[0].lots[1].attributes["unit-weight"], "5,0");
    }

    #[test]
    fn test_header_with_whole_number_total() {
        let groups = parse("00063 - PRODUCT X KG 100 40 45 50,0 123456789012345").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].product_name, "PRODUCT X");
        assert_eq!(groups[0].total_weight.as_deref(), Some("100"));
        assert_eq!(lot_ids(&groups[0]), vec!["123456789012345"]);
        assert_eq!(groups[0].lots[0].attributes["format"], "40");
    }

    #[test]
    fn test_duplicate_lot_identifiers_are_kept() {
        let text = "00063 - KRAFT LINER KG 100,0 40 45 50,0 888888888888 40 45 50,0 888888888888";
        let groups = parse(text).unwrap();
        assert_eq!(lot_ids(&groups[0]), vec!["888888888888", "888888888888"]);
    }

    #[test]
    fn test_catalog_fallback_only_when_generic_finds_nothing() {
        let catalog = vec![CatalogEntry {
            code: "00099".into(),
            name: "PAPEL CARTAO".into(),
        }];
        let irregular = "RELACAO PAPEL CARTAO TOTAL: 980,5 BOBINAS 123450000001 123450000002";
        let groups = ManifestParser::default()
            .with_catalog(catalog.clone())
            .parse(irregular)
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].product_code, "00099");
        assert_eq!(groups[0].total_weight.as_deref(), Some("980,5"));
        assert_eq!(lot_ids(&groups[0]), vec!["123450000001", "123450000002"]);
        assert_eq!(groups[0].lots[0].strategy, ExtractionStrategy::Catalog);

        let regular = format!("{SCENARIO_A} PAPEL CARTAO 123450000003");
        let groups = ManifestParser::default()
            .with_catalog(catalog)
            .parse(&regular)
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(lot_ids(&groups[0]), vec!["123456789012345"]);
    }

    #[test]
    fn test_disabled_strategy_is_skipped() {
        let section = ParserSection {
            strategies: vec![ExtractionStrategy::Header, ExtractionStrategy::LabeledLot],
            ..ParserSection::default()
        };
        let parser = ManifestParser::from_config(&section);
        assert_eq!(parser.parse(SCENARIO_A), Err(ParseError::NoRecordsFound));
    }

    #[test]
    fn test_total_weight_value() {
        let groups = parse(SCENARIO_A).unwrap();
        assert_eq!(groups[0].total_weight_value(), Some(100.5));
        assert_eq!(decimal_value("12.5"), Some(12.5));
        assert_eq!(decimal_value("abc"), None);
    }
}
