use super::{Candidate, CatalogEntry, ExtractionStrategy, LotCandidate, ProductRef};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Weight numerals as printed: `1.250,00`, `100,5`, `12.5`. A decimal part is required.
const WEIGHT: &str = r"\d{1,3}(?:\.\d{3})+,\d+|\d+[.,]\d+";

/// Product name: words, each optionally followed by one number (`MIOLO 120`).
/// Two numbers in a row end the name; that is where detail rows begin.
const NAME: &str = r"[^\d\s]\S*(?:[^\S\n]+\d\S*)?(?:[^\S\n]+[^\d\s]\S*(?:[^\S\n]+\d\S*)?){0,11}?";

// a whole-number total is only trusted after an explicit KG marker
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{5}})\s*-\s*({NAME})[^\S\n]+(?:KGS?\s*:?\s*({WEIGHT}|\d+)|({WEIGHT}))(?:\s|$)"
    ))
    .expect("header pattern")
});

// [code /] format basis-weight unit-weight lot
static DETAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(\d{5})\s*/\s*)?(\d{2,4}(?:[xX]\d{2,4})?)\s+(\d{2,3})\s+(\d{1,4}(?:[.,]\d{1,3})?)\s+(\d{10,20})\b",
    )
    .expect("detail pattern")
});

static LABELED_LOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLOTE\s*(?:N[º°O.]?\s*)?:?\s*(\d{6,20})\b").expect("labeled lot pattern")
});

static PRODUCT_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPRODUTO\s*:?\s*(\d{5})\b").expect("product label pattern"));

static FORMAT_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bFORMATO\s*:?\s*(\d{2,4}(?:\s*[xX]\s*\d{2,4})?)").expect("format label pattern")
});

static BASIS_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bGRAMATURA\s*:?\s*(\d+(?:[.,]\d+)?)").expect("basis-weight label pattern")
});

static WEIGHT_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bPESO(?:\s+L[IÍ]Q\w*\.?)?\s*:?\s*(\d+(?:[.,]\d+)?)").expect("weight label pattern")
});

static CATALOG_TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:TOTAL|KGS?)\s*:?\s*({WEIGHT})"))
        .expect("catalog total pattern")
});

/// How far past a `LOTE` label its `FORMATO` / `GRAMATURA` / `PESO` fields may sit.
const LABEL_FIELD_WINDOW: usize = 96;

static LOT_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{10,20})\b").expect("lot number pattern"));

pub(crate) fn run(strategy: ExtractionStrategy, text: &str) -> Vec<Candidate> {
    match strategy {
        ExtractionStrategy::Header => headers(text),
        ExtractionStrategy::DetailLine => detail_lines(text),
        ExtractionStrategy::LabeledLot => labeled_lots(text),
        // needs the catalog; driven separately as a fallback
        ExtractionStrategy::Catalog => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Header lines
// ---------------------------------------------------------------------------

fn headers(text: &str) -> Vec<Candidate> {
    HEADER_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let total = cap.get(3).or_else(|| cap.get(4))?;
            Some(Candidate {
                offset: whole.start(),
                strategy: ExtractionStrategy::Header,
                product: Some(ProductRef {
                    code: cap[1].to_string(),
                    name: cap[2].trim().to_string(),
                }),
                total_weight: Some(total.as_str().to_string()),
                lot: None,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Bare numeric detail lines
// ---------------------------------------------------------------------------

fn detail_lines(text: &str) -> Vec<Candidate> {
    DETAIL_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let product = cap.get(1).map(|code| ProductRef {
                code: code.as_str().to_string(),
                name: String::new(),
            });

            let mut attributes = BTreeMap::new();
            attributes.insert("format".to_string(), cap[2].to_string());
            attributes.insert("basis-weight".to_string(), cap[3].to_string());
            attributes.insert("unit-weight".to_string(), cap[4].to_string());

            Some(Candidate {
                offset: whole.start(),
                strategy: ExtractionStrategy::DetailLine,
                product,
                total_weight: None,
                lot: Some(LotCandidate {
                    identifier: cap[5].to_string(),
                    attributes,
                }),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Labeled per-lot blocks
// ---------------------------------------------------------------------------

fn labeled_lots(text: &str) -> Vec<Candidate> {
    // PRODUTO labels open a group at their own position; the lots after them
    // attach through the usual closest-preceding-product rule
    let mut candidates: Vec<Candidate> = PRODUCT_LABEL_RE
        .captures_iter(text)
        .filter_map(|cap| {
            Some(Candidate {
                offset: cap.get(0)?.start(),
                strategy: ExtractionStrategy::LabeledLot,
                product: Some(ProductRef {
                    code: cap[1].to_string(),
                    name: String::new(),
                }),
                total_weight: None,
                lot: None,
            })
        })
        .collect();

    let hits: Vec<_> = LABELED_LOT_RE.captures_iter(text).collect();
    for (i, cap) in hits.iter().enumerate() {
        let (Some(whole), Some(id)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let next_start = hits
            .get(i + 1)
            .and_then(|c| c.get(0))
            .map_or(text.len(), |m| m.start());
        let stop = floor_char_boundary(text, (whole.end() + LABEL_FIELD_WINDOW).min(next_start));
        let after = &text[whole.end()..stop];

        let mut attributes = BTreeMap::new();
        for (key, re) in [
            ("format", &*FORMAT_LABEL_RE),
            ("basis-weight", &*BASIS_LABEL_RE),
            ("unit-weight", &*WEIGHT_LABEL_RE),
        ] {
            if let Some(c) = re.captures(after) {
                attributes.insert(key.to_string(), c[1].to_string());
            }
        }

        candidates.push(Candidate {
            offset: whole.start(),
            strategy: ExtractionStrategy::LabeledLot,
            product: None,
            total_weight: None,
            lot: Some(LotCandidate {
                identifier: id.as_str().to_string(),
                attributes,
            }),
        });
    }

    candidates
}

// ---------------------------------------------------------------------------
// Catalog proximity fallback
// ---------------------------------------------------------------------------

/// Earliest position where the entry's code or name appears, as (start, end).
fn locate(text: &str, entry: &CatalogEntry) -> Option<(usize, usize)> {
    let mut patterns = Vec::new();
    if !entry.code.trim().is_empty() {
        patterns.push(format!(r"\b{}\b", regex::escape(entry.code.trim())));
    }
    let words: Vec<String> = entry.name.split_whitespace().map(regex::escape).collect();
    if !words.is_empty() {
        patterns.push(format!(r"(?i)\b{}\b", words.join(r"\s+")));
    }

    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .filter_map(|re| re.find(text).map(|m| (m.start(), m.end())))
        .min_by_key(|(start, _)| *start)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

pub(crate) fn catalog(text: &str, entries: &[CatalogEntry], window: usize) -> Vec<Candidate> {
    let mut hits: Vec<(usize, usize, &CatalogEntry)> = entries
        .iter()
        .filter_map(|entry| locate(text, entry).map(|(start, end)| (start, end, entry)))
        .collect();
    hits.sort_by_key(|(start, _, _)| *start);

    let mut candidates = Vec::new();
    for (i, (start, end, entry)) in hits.iter().enumerate() {
        let limit = hits.get(i + 1).map_or(text.len(), |(next, _, _)| *next);
        let stop = floor_char_boundary(text, (end + window).min(limit)).max(*end);
        let region = &text[*end..stop];

        let product = ProductRef {
            code: entry.code.trim().to_string(),
            name: entry.name.trim().to_string(),
        };

        candidates.push(Candidate {
            offset: *start,
            strategy: ExtractionStrategy::Catalog,
            product: Some(product.clone()),
            total_weight: CATALOG_TOTAL_RE.captures(region).map(|c| c[1].to_string()),
            lot: None,
        });

        for m in LOT_NUMBER_RE.find_iter(region) {
            candidates.push(Candidate {
                offset: end + m.start(),
                strategy: ExtractionStrategy::Catalog,
                product: Some(product.clone()),
                total_weight: None,
                lot: Some(LotCandidate {
                    identifier: m.as_str().to_string(),
                    attributes: BTreeMap::new(),
                }),
            });
        }
    }

    candidates
}
