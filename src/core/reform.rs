use super::error::ParameterError;
use super::parameters::{ParameterPath, ParameterTree};
use super::types::Period;

pub trait Reform {
    fn name(&self) -> &str;

    fn apply(&self, parameters: &mut ParameterTree) -> Result<(), ParameterError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterOverride {
    name: String,
    path: ParameterPath,
    effective: Period,
    stop: Option<Period>,
    value: f64,
}

impl ParameterOverride {
    pub fn new(name: impl Into<String>, path: ParameterPath, effective: Period, value: f64) -> Self {
        Self {
            name: name.into(),
            path,
            effective,
            stop: None,
            value,
        }
    }

    pub fn until(mut self, stop: Period) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn delete_plafond_qf() -> Result<Self, ParameterError> {
        let effective = Period::year(2018).ok_or_else(|| ParameterError::InvalidPath {
            path: "impot_revenu.plafond_qf.reduc_postplafond".to_string(),
            reason: "reform year out of range".to_string(),
        })?;
        Ok(Self::new(
            "delete_plafond_qf",
            "impot_revenu.plafond_qf.reduc_postplafond".parse()?,
            effective,
            0.0,
        ))
    }

    /// Overwrites the target parameter from the effective period start (up to the stop
    /// period start, when set) and hands the same tree back.
    pub fn apply_override<'t>(
        &self,
        parameters: &'t mut ParameterTree,
    ) -> Result<&'t mut ParameterTree, ParameterError> {
        parameters
            .parameter_mut(&self.path)?
            .update(
                self.effective.start(),
                self.stop.map(|p| p.start()),
                self.value,
            );
        Ok(parameters)
    }
}

impl Reform for ParameterOverride {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, parameters: &mut ParameterTree) -> Result<(), ParameterError> {
        self.apply_override(parameters).map(|_| ())
    }
}

pub struct ReformSet {
    name: String,
    reforms: Vec<Box<dyn Reform + Send + Sync>>,
}

impl ReformSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reforms: Vec::new(),
        }
    }

    pub fn push(&mut self, reform: Box<dyn Reform + Send + Sync>) {
        self.reforms.push(reform);
    }

    pub fn is_empty(&self) -> bool {
        self.reforms.is_empty()
    }
}

impl Reform for ReformSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, parameters: &mut ParameterTree) -> Result<(), ParameterError> {
        for reform in &self.reforms {
            reform.apply(parameters)?;
        }
        Ok(())
    }
}

pub fn builtin_reform(name: &str) -> Option<Result<ParameterOverride, ParameterError>> {
    match name {
        "delete_plafond_qf" => Some(ParameterOverride::delete_plafond_qf()),
        _ => None,
    }
}

pub const BUILTIN_REFORMS: &[&str] = &["delete_plafond_qf"];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parameters::{Parameter, ParameterNode};
    use chrono::NaiveDate;
    use indexmap::IndexMap;
    use proptest::prelude::{prop_assert_eq, proptest};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tree_with(values: &[(NaiveDate, f64)]) -> ParameterTree {
        let mut parameter = Parameter::new();
        for (d, v) in values {
            parameter = parameter.with_value(*d, *v);
        }
        let mut root = IndexMap::new();
        root.insert(
            "impot_revenu".to_string(),
            ParameterNode::branch([(
                "plafond_qf",
                ParameterNode::branch([("reduc_postplafond", ParameterNode::Parameter(parameter))]),
            )]),
        );
        ParameterTree::new(root)
    }

    #[test]
    fn delete_plafond_qf_zeroes_from_2018_and_keeps_history() {
        let mut tree = tree_with(&[
            (date(2014, 1, 1), 1500.0),
            (date(2017, 1, 1), 1504.0),
            (date(2019, 1, 1), 1520.0),
        ]);
        let reform = ParameterOverride::delete_plafond_qf().expect("builtin reform");
        reform.apply_override(&mut tree).expect("path exists");

        let path = "impot_revenu.plafond_qf.reduc_postplafond";
        assert_eq!(tree.value_at(path, date(2014, 6, 1)), Ok(1500.0));
        assert_eq!(tree.value_at(path, date(2017, 12, 31)), Ok(1504.0));
        assert_eq!(tree.value_at(path, date(2018, 1, 1)), Ok(0.0));
        assert_eq!(tree.value_at(path, date(2025, 1, 1)), Ok(0.0));
    }

    #[test]
    fn apply_override_returns_the_same_tree_for_chaining() {
        let mut tree = tree_with(&[(date(2014, 1, 1), 1500.0)]);
        let first = ParameterOverride::new(
            "first",
            "impot_revenu.plafond_qf.reduc_postplafond".parse().unwrap(),
            Period::year(2016).unwrap(),
            10.0,
        );
        let second = ParameterOverride::new(
            "second",
            "impot_revenu.plafond_qf.reduc_postplafond".parse().unwrap(),
            Period::year(2018).unwrap(),
            20.0,
        );
        let chained = second
            .apply_override(first.apply_override(&mut tree).unwrap())
            .unwrap();
        let path = "impot_revenu.plafond_qf.reduc_postplafond";
        assert_eq!(chained.value_at(path, date(2017, 1, 1)), Ok(10.0));
        assert_eq!(chained.value_at(path, date(2018, 1, 1)), Ok(20.0));
    }

    #[test]
    fn bounded_override_restores_the_previous_value_at_stop() {
        let mut tree = tree_with(&[(date(2014, 1, 1), 1500.0), (date(2017, 1, 1), 1504.0)]);
        let reform = ParameterOverride::new(
            "temporary",
            "impot_revenu.plafond_qf.reduc_postplafond".parse().unwrap(),
            Period::year(2018).unwrap(),
            0.0,
        )
        .until(Period::year(2020).unwrap());
        reform.apply_override(&mut tree).unwrap();

        let path = "impot_revenu.plafond_qf.reduc_postplafond";
        assert_eq!(tree.value_at(path, date(2017, 6, 1)), Ok(1504.0));
        assert_eq!(tree.value_at(path, date(2018, 1, 1)), Ok(0.0));
        assert_eq!(tree.value_at(path, date(2019, 12, 31)), Ok(0.0));
        assert_eq!(tree.value_at(path, date(2020, 1, 1)), Ok(1504.0));
    }

    #[test]
    fn missing_path_fails_instead_of_doing_nothing() {
        let mut root = IndexMap::new();
        root.insert("prestations".to_string(), ParameterNode::branch::<_, String>([]));
        let mut tree = ParameterTree::new(root);
        let before = tree.clone();

        let reform = ParameterOverride::delete_plafond_qf().unwrap();
        let err = reform.apply_override(&mut tree).expect_err("missing path must fail");
        assert_eq!(
            err,
            ParameterError::NotFound {
                path: "impot_revenu.plafond_qf.reduc_postplafond".into()
            }
        );
        assert_eq!(tree, before);
    }

    #[test]
    fn overriding_a_branch_is_rejected() {
        let mut tree = tree_with(&[(date(2014, 1, 1), 1.0)]);
        let reform = ParameterOverride::new(
            "bad",
            "impot_revenu.plafond_qf".parse().unwrap(),
            Period::year(2018).unwrap(),
            0.0,
        );
        assert!(matches!(
            reform.apply_override(&mut tree),
            Err(ParameterError::NotAParameter { .. })
        ));
    }

    #[test]
    fn reform_set_applies_members_in_order() {
        let mut tree = tree_with(&[(date(2014, 1, 1), 1500.0)]);
        let path: ParameterPath = "impot_revenu.plafond_qf.reduc_postplafond".parse().unwrap();
        let mut set = ReformSet::new("both");
        set.push(Box::new(ParameterOverride::new(
            "a",
            path.clone(),
            Period::year(2016).unwrap(),
            1.0,
        )));
        set.push(Box::new(ParameterOverride::new(
            "b",
            path.clone(),
            Period::year(2016).unwrap(),
            2.0,
        )));
        set.apply(&mut tree).unwrap();
        assert_eq!(set.name(), "both");
        assert_eq!(tree.value_at(path.as_str(), date(2016, 1, 1)), Ok(2.0));
    }

    #[test]
    fn builtin_lookup_knows_only_catalogue_names() {
        for name in BUILTIN_REFORMS {
            assert!(builtin_reform(name).is_some());
        }
        assert!(builtin_reform("unknown").is_none());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_override_splits_timeline_at_effective_start(
            start_years in proptest::collection::btree_set(1990i32..2040, 1..8),
            reform_year in 1990i32..2040,
            value in -1.0e6f64..1.0e6,
        ) {
            let entries: Vec<(NaiveDate, f64)> = start_years
                .iter()
                .enumerate()
                .map(|(i, y)| (date(*y, 1, 1), i as f64 + 1.0))
                .collect();
            let original = tree_with(&entries);
            let mut reformed = original.clone();
            let path = "impot_revenu.plafond_qf.reduc_postplafond";
            ParameterOverride::new("p", path.parse().unwrap(), Period::year(reform_year).unwrap(), value)
                .apply_override(&mut reformed)
                .unwrap();

            for year in 1985i32..2045 {
                for month in [1u32, 7] {
                    let d = date(year, month, 1);
                    let after = reformed.value_at(path, d);
                    if year < reform_year {
                        prop_assert_eq!(after, original.value_at(path, d));
                    } else {
                        prop_assert_eq!(after, Ok(value));
                    }
                }
            }
        }
    }
}
