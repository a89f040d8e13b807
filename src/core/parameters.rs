use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::error::ParameterError;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
enum Segment {
    Name(String),
    Index(usize),
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ParameterPath {
    raw: String,
    segments: Vec<Segment>,
}

impl ParameterPath {
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ParameterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ParameterPath {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ParameterError::InvalidPath {
            path: s.to_string(),
            reason: reason.to_string(),
        };
        if s.trim().is_empty() {
            return Err(invalid("empty path"));
        }

        let mut segments = Vec::new();
        for piece in s.split('.') {
            let (name, mut rest) = match piece.find('[') {
                Some(idx) => (&piece[..idx], &piece[idx..]),
                None => (piece, ""),
            };
            if name.is_empty() {
                return Err(invalid("empty segment name"));
            }
            segments.push(Segment::Name(name.to_string()));

            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(|| invalid("unclosed '['"))?;
                if !rest.starts_with('[') {
                    return Err(invalid("unexpected text after index"));
                }
                let index = rest[1..close]
                    .parse::<usize>()
                    .map_err(|_| invalid("index must be a non-negative integer"))?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self {
            raw: s.to_string(),
            segments,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Parameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    values: BTreeMap<NaiveDate, f64>,
}

impl Parameter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, start: NaiveDate, value: f64) -> Self {
        self.values.insert(start, value);
        self
    }

    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.values.range(..=date).next_back().map(|(_, v)| *v)
    }

    pub fn values(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.values.iter().map(|(d, v)| (*d, *v))
    }

    /// Sets `value` from `start` until `stop` (exclusive), or indefinitely when `stop` is
    /// `None`. Entries starting before `start` are left untouched.
    pub fn update(&mut self, start: NaiveDate, stop: Option<NaiveDate>, value: f64) {
        match stop {
            None => {
                self.values.retain(|d, _| *d < start);
            }
            Some(stop) => {
                if stop <= start {
                    return;
                }
                if !self.values.contains_key(&stop) {
                    if let Some(resumed) = self.value_at(stop) {
                        self.values.insert(stop, resumed);
                    }
                }
                self.values.retain(|d, _| *d < start || *d >= stop);
            }
        }
        self.values.insert(start, value);
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParameterNode {
    Parameter(Parameter),
    Scale(Vec<ParameterNode>),
    Branch(IndexMap<String, ParameterNode>),
}

impl ParameterNode {
    pub fn branch<I, K>(children: I) -> Self
    where
        I: IntoIterator<Item = (K, ParameterNode)>,
        K: Into<String>,
    {
        ParameterNode::Branch(children.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_parameter(&self) -> Option<&Parameter> {
        match self {
            ParameterNode::Parameter(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_scale(&self) -> Option<&[ParameterNode]> {
        match self {
            ParameterNode::Scale(items) => Some(items),
            _ => None,
        }
    }

    fn step(&self, segment: &Segment) -> Option<&ParameterNode> {
        match (self, segment) {
            (ParameterNode::Branch(children), Segment::Name(name)) => children.get(name),
            (ParameterNode::Scale(items), Segment::Index(idx)) => items.get(*idx),
            _ => None,
        }
    }

    fn step_mut(&mut self, segment: &Segment) -> Option<&mut ParameterNode> {
        match (self, segment) {
            (ParameterNode::Branch(children), Segment::Name(name)) => children.get_mut(name),
            (ParameterNode::Scale(items), Segment::Index(idx)) => items.get_mut(*idx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ParameterTree {
    root: IndexMap<String, ParameterNode>,
}

impl ParameterTree {
    pub fn new(root: IndexMap<String, ParameterNode>) -> Self {
        Self { root }
    }

    pub fn node(&self, path: &ParameterPath) -> Result<&ParameterNode, ParameterError> {
        let not_found = || ParameterError::NotFound {
            path: path.to_string(),
        };
        let mut segments = path.segments.iter();
        let mut node = match segments.next() {
            Some(Segment::Name(name)) => self.root.get(name).ok_or_else(not_found)?,
            _ => return Err(not_found()),
        };
        for segment in segments {
            node = node.step(segment).ok_or_else(not_found)?;
        }
        Ok(node)
    }

    pub fn node_mut(&mut self, path: &ParameterPath) -> Result<&mut ParameterNode, ParameterError> {
        let not_found = || ParameterError::NotFound {
            path: path.to_string(),
        };
        let mut segments = path.segments.iter();
        let mut node = match segments.next() {
            Some(Segment::Name(name)) => self.root.get_mut(name).ok_or_else(not_found)?,
            _ => return Err(not_found()),
        };
        for segment in segments {
            node = node.step_mut(segment).ok_or_else(not_found)?;
        }
        Ok(node)
    }

    pub fn parameter(&self, path: &ParameterPath) -> Result<&Parameter, ParameterError> {
        self.node(path)?
            .as_parameter()
            .ok_or_else(|| ParameterError::NotAParameter {
                path: path.to_string(),
            })
    }

    pub fn parameter_mut(&mut self, path: &ParameterPath) -> Result<&mut Parameter, ParameterError> {
        match self.node_mut(path)? {
            ParameterNode::Parameter(p) => Ok(p),
            _ => Err(ParameterError::NotAParameter {
                path: path.to_string(),
            }),
        }
    }

    pub fn value_at(&self, path: &str, date: NaiveDate) -> Result<f64, ParameterError> {
        let path: ParameterPath = path.parse()?;
        self.parameter(&path)?
            .value_at(date)
            .ok_or_else(|| ParameterError::NoValue {
                path: path.to_string(),
                date,
            })
    }

    pub fn scale_len(&self, path: &str) -> Result<usize, ParameterError> {
        let parsed: ParameterPath = path.parse()?;
        self.node(&parsed)?
            .as_scale()
            .map(<[ParameterNode]>::len)
            .ok_or_else(|| ParameterError::NotAParameter {
                path: path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_tree() -> ParameterTree {
        let rate = Parameter::new()
            .with_value(date(2015, 1, 1), 0.14)
            .with_value(date(2017, 1, 1), 0.145);
        let mut root = IndexMap::new();
        root.insert(
            "impot_revenu".to_string(),
            ParameterNode::branch([(
                "bareme",
                ParameterNode::Scale(vec![
                    ParameterNode::branch([(
                        "taux",
                        ParameterNode::Parameter(Parameter::new().with_value(date(2015, 1, 1), 0.0)),
                    )]),
                    ParameterNode::branch([("taux", ParameterNode::Parameter(rate))]),
                ]),
            )]),
        );
        ParameterTree::new(root)
    }

    #[test]
    fn path_parses_names_and_indices() {
        let path: ParameterPath = "impot_revenu.bareme[1].taux".parse().expect("valid path");
        assert_eq!(
            path.segments,
            vec![
                Segment::Name("impot_revenu".into()),
                Segment::Name("bareme".into()),
                Segment::Index(1),
                Segment::Name("taux".into()),
            ]
        );
        assert_eq!(path.as_str(), "impot_revenu.bareme[1].taux");
    }

    #[test]
    fn path_rejects_malformed_input() {
        for bad in ["", "a..b", "a[", "a[x]", "a[1]b", "[0]"] {
            assert!(
                matches!(
                    bad.parse::<ParameterPath>(),
                    Err(ParameterError::InvalidPath { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn value_at_uses_latest_start_not_after_date() {
        let tree = sample_tree();
        let path = "impot_revenu.bareme[1].taux";
        assert_eq!(tree.value_at(path, date(2016, 6, 1)), Ok(0.14));
        assert_eq!(tree.value_at(path, date(2017, 1, 1)), Ok(0.145));
        assert_eq!(
            tree.value_at(path, date(2010, 1, 1)),
            Err(ParameterError::NoValue {
                path: path.to_string(),
                date: date(2010, 1, 1),
            })
        );
    }

    #[test]
    fn navigation_reports_missing_and_non_leaf_paths() {
        let tree = sample_tree();
        assert_eq!(
            tree.value_at("impot_revenu.bareme[5].taux", date(2018, 1, 1)),
            Err(ParameterError::NotFound {
                path: "impot_revenu.bareme[5].taux".into()
            })
        );
        assert_eq!(
            tree.value_at("impot_revenu.bareme", date(2018, 1, 1)),
            Err(ParameterError::NotAParameter {
                path: "impot_revenu.bareme".into()
            })
        );
        assert_eq!(tree.scale_len("impot_revenu.bareme"), Ok(2));
    }

    #[test]
    fn open_ended_update_replaces_later_values_only() {
        let mut p = Parameter::new()
            .with_value(date(2014, 1, 1), 1.0)
            .with_value(date(2016, 1, 1), 2.0)
            .with_value(date(2019, 1, 1), 3.0);
        p.update(date(2017, 1, 1), None, 0.0);
        assert_eq!(
            p.values().collect::<Vec<_>>(),
            vec![
                (date(2014, 1, 1), 1.0),
                (date(2016, 1, 1), 2.0),
                (date(2017, 1, 1), 0.0),
            ]
        );
    }

    #[test]
    fn bounded_update_restores_previous_value_at_stop() {
        let mut p = Parameter::new()
            .with_value(date(2014, 1, 1), 1.0)
            .with_value(date(2016, 1, 1), 2.0);
        p.update(date(2015, 1, 1), Some(date(2017, 1, 1)), 9.0);
        assert_eq!(p.value_at(date(2014, 6, 1)), Some(1.0));
        assert_eq!(p.value_at(date(2016, 6, 1)), Some(9.0));
        assert_eq!(p.value_at(date(2017, 1, 1)), Some(2.0));
    }

    #[test]
    fn tree_round_trips_through_json_shape() {
        let tree: ParameterTree = serde_json::from_str(
            r#"{
                "impot_revenu": {
                    "plafond_qf": {
                        "reduc_postplafond": {
                            "description": "complementary reduction",
                            "values": { "2015-01-01": 1497, "2017-01-01": 1504 }
                        }
                    },
                    "bareme": [
                        { "seuil": { "values": { "2015-01-01": 0 } } }
                    ]
                }
            }"#,
        )
        .expect("valid tree");
        assert_eq!(
            tree.value_at("impot_revenu.plafond_qf.reduc_postplafond", date(2018, 1, 1)),
            Ok(1504.0)
        );
        assert_eq!(
            tree.value_at("impot_revenu.bareme[0].seuil", date(2018, 1, 1)),
            Ok(0.0)
        );
    }
}
