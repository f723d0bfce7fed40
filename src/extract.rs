use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::document::{css, Document, Node, Selector, SelectorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    PerfumeName,
    Brand,
    ReleaseYear,
    FragranceNotes,
    Perfumers,
    Rating,
    MainAccords,
    MarketingCompany,
    ImagePath,
}

impl Field {
    /// CSV column header.
    pub fn header(self) -> &'static str {
        match self {
            Field::PerfumeName => "Perfume Name",
            Field::Brand => "Brand",
            Field::ReleaseYear => "Release Year",
            Field::FragranceNotes => "Fragrance Notes",
            Field::Perfumers => "Perfumers",
            Field::Rating => "Rating",
            Field::MainAccords => "Main Accords",
            Field::MarketingCompany => "Marketing Company",
            Field::ImagePath => "Image Path",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) if n.fract() == 0.0 => write!(f, "{:.1}", n),
            FieldValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// One flattened catalog item. Fields never found on the page are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<Field, FieldValue>,
}

impl Record {
    pub fn set(&mut self, field: Field, value: FieldValue) {
        self.values.insert(field, value);
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.values.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn title(&self) -> Option<&str> {
        match self.get(Field::PerfumeName) {
            Some(FieldValue::Text(t)) => Some(t),
            _ => None,
        }
    }

    /// Cells in `columns` order; absent fields become empty strings.
    pub fn cells(&self, columns: &[Field]) -> Vec<String> {
        columns
            .iter()
            .map(|f| self.get(*f).map(|v| v.to_string()).unwrap_or_default())
            .collect()
    }
}

/// How several rating markers on one page collapse into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RatingPolicy {
    First,
    Mean,
}

/// Page layouts handled by the scraper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Full detail page: title-scoped brand/year, perfumers, marketing company.
    Detailed,
    /// Bulk popular-brands layout: page-wide brand/year/rating markers.
    Popular,
}

impl Profile {
    /// Columns this profile can populate, excluding Image Path.
    pub fn fields(self) -> &'static [Field] {
        match self {
            Profile::Detailed => &[
                Field::PerfumeName,
                Field::Brand,
                Field::ReleaseYear,
                Field::FragranceNotes,
                Field::Perfumers,
                Field::Rating,
                Field::MainAccords,
                Field::MarketingCompany,
            ],
            Profile::Popular => &[
                Field::PerfumeName,
                Field::Brand,
                Field::ReleaseYear,
                Field::FragranceNotes,
                Field::Rating,
                Field::MainAccords,
            ],
        }
    }

    pub fn default_rating(self) -> RatingPolicy {
        match self {
            Profile::Detailed => RatingPolicy::First,
            Profile::Popular => RatingPolicy::Mean,
        }
    }

    pub fn replaces_spaces_in_image_names(self) -> bool {
        matches!(self, Profile::Popular)
    }

    fn specs(self, rating: RatingPolicy) -> Result<(Vec<FieldSpec>, Locator), SelectorError> {
        use Field::*;

        let specs = match self {
            Profile::Detailed => vec![
                spec(PerfumeName, vec![find("h1.p_name_h1")?], ValueKind::OwnText),
                spec(
                    Brand,
                    vec![
                        find("h1.p_name_h1")?,
                        find("span[itemprop=brand]")?,
                        find("[itemprop=name]")?,
                    ],
                    ValueKind::Text,
                ),
                spec(
                    ReleaseYear,
                    vec![find("h1.p_name_h1")?, find("a[href*=Release_Years]")?],
                    ValueKind::StripParens,
                ),
                spec(
                    FragranceNotes,
                    vec![find("div.notes_list")?],
                    ValueKind::Join(css("span.nowrap")?),
                ),
                spec(
                    Perfumers,
                    vec![find("div.w-100.mt-0-5.mb-3")?],
                    ValueKind::Join(css("a[href*=Perfumers]")?),
                ),
                spec(
                    Rating,
                    vec![find("[itemprop=aggregateRating]")?],
                    ValueKind::Numbers(css("[itemprop=ratingValue]")?, rating),
                ),
                spec(
                    MainAccords,
                    vec![
                        Step::FindWithText(css("h2")?, "Main accords"),
                        Step::NextSibling(css("div")?),
                    ],
                    ValueKind::Join(css("div.text-xs")?),
                ),
                spec(
                    MarketingCompany,
                    vec![find("div.p_details_desc")?, find("a[href*=makers]")?],
                    ValueKind::Text,
                ),
            ],
            Profile::Popular => vec![
                spec(PerfumeName, vec![find("h1.p_name_h1")?], ValueKind::OwnText),
                spec(Brand, vec![find("span[itemprop=name]")?], ValueKind::Text),
                spec(ReleaseYear, vec![find("span.label_a")?], ValueKind::StripParens),
                spec(
                    FragranceNotes,
                    vec![],
                    ValueKind::Join(css("span.nowrap.pointer")?),
                ),
                spec(
                    Rating,
                    vec![],
                    ValueKind::Numbers(css("span[itemprop=ratingValue]")?, rating),
                ),
                spec(
                    MainAccords,
                    vec![find("div.accords")?],
                    ValueKind::Join(css("div.text-xs.grey")?),
                ),
            ],
        };

        let image = match self {
            Profile::Detailed => Locator {
                path: vec![find("img[itemprop=image]")?],
                value: ValueKind::Attr("src"),
            },
            Profile::Popular => Locator {
                path: vec![find("img.p-main-img")?],
                value: ValueKind::Attr("src"),
            },
        };

        Ok((specs, image))
    }
}

/// One navigation step from the current scope.
pub enum Step {
    Find(Selector),
    FindWithText(Selector, &'static str),
    NextSibling(Selector),
}

impl Step {
    fn apply<'a>(&self, node: Node<'a>) -> Option<Node<'a>> {
        match self {
            Step::Find(sel) => node.find(sel),
            Step::FindWithText(sel, text) => node.find_with_text(sel, text),
            Step::NextSibling(sel) => node.next_sibling(sel),
        }
    }
}

/// How the value is read off the element the path lands on.
pub enum ValueKind {
    Text,
    /// Direct text of the element; falls back to full text when empty.
    OwnText,
    /// Full text with enclosing parentheses removed.
    StripParens,
    /// Texts of all matching descendants joined with ", ".
    Join(Selector),
    /// Numeric texts of matching descendants collapsed by the policy.
    Numbers(Selector, RatingPolicy),
    Attr(&'static str),
}

impl ValueKind {
    fn read(&self, node: Node<'_>) -> Option<FieldValue> {
        match self {
            ValueKind::Text => non_empty(node.text()),
            ValueKind::OwnText => {
                let own = node.own_text();
                non_empty(if own.is_empty() { node.text() } else { own })
            }
            ValueKind::StripParens => {
                let text = node.text();
                non_empty(text.trim_matches(|c: char| c == '(' || c == ')').trim().to_string())
            }
            ValueKind::Join(sel) => {
                let items: Vec<String> = node
                    .find_all(sel)
                    .iter()
                    .map(|n| n.text())
                    .filter(|t| !t.is_empty())
                    .collect();
                non_empty(items.join(", "))
            }
            ValueKind::Numbers(sel, policy) => {
                let mut numbers = node
                    .find_all(sel)
                    .into_iter()
                    .map(|n| n.text())
                    .filter_map(|t| t.parse::<f64>().ok().map(|v| (t, v)));
                match policy {
                    // Page text as written, so "8" stays "8".
                    RatingPolicy::First => numbers.next().map(|(t, _)| FieldValue::Text(t)),
                    RatingPolicy::Mean => {
                        let all: Vec<f64> = numbers.map(|(_, v)| v).collect();
                        if all.is_empty() {
                            return None;
                        }
                        Some(FieldValue::Number(all.iter().sum::<f64>() / all.len() as f64))
                    }
                }
            }
            ValueKind::Attr(name) => node
                .attr(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| FieldValue::Text(v.to_string())),
        }
    }
}

/// A path from the document root plus the value reader at its end.
pub struct Locator {
    pub path: Vec<Step>,
    pub value: ValueKind,
}

impl Locator {
    /// Each step tolerates absence; the first miss yields `None`.
    fn evaluate(&self, root: Node<'_>) -> Option<FieldValue> {
        let target = self
            .path
            .iter()
            .try_fold(root, |node, step| step.apply(node))?;
        self.value.read(target)
    }
}

pub struct FieldSpec {
    pub field: Field,
    pub locator: Locator,
}

fn spec(field: Field, path: Vec<Step>, value: ValueKind) -> FieldSpec {
    FieldSpec {
        field,
        locator: Locator { path, value },
    }
}

fn find(selector: &str) -> Result<Step, SelectorError> {
    Ok(Step::Find(css(selector)?))
}

fn non_empty(s: String) -> Option<FieldValue> {
    if s.is_empty() {
        None
    } else {
        Some(FieldValue::Text(s))
    }
}

pub struct Extraction {
    pub record: Record,
    pub image_url: Option<String>,
}

pub struct Extractor {
    specs: Vec<FieldSpec>,
    image: Locator,
}

impl Extractor {
    pub fn new(profile: Profile, rating: RatingPolicy) -> Result<Self, SelectorError> {
        let (specs, image) = profile.specs(rating)?;
        Ok(Self { specs, image })
    }

    pub fn extract(&self, doc: &Document) -> Extraction {
        let root = doc.root();
        let mut record = Record::default();
        for spec in &self.specs {
            if let Some(value) = spec.locator.evaluate(root) {
                record.set(spec.field, value);
            }
        }
        let image_url = match self.image.evaluate(root) {
            Some(FieldValue::Text(url)) => Some(url),
            _ => None,
        };
        Extraction { record, image_url }
    }
}

// ── Tests ──
