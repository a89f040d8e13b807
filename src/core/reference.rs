use chrono::NaiveDate;
use indexmap::IndexMap;

use super::error::SimulationError;
use super::legislation::{EntityKind, Legislation, LegislationSimulation, Simulation};
use super::parameters::{Parameter, ParameterNode, ParameterTree};
use super::types::{Household, Period};

const BAREME_RATES: [f64; 5] = [0.0, 0.14, 0.30, 0.41, 0.45];

const BAREME_THRESHOLDS: &[(i32, [f64; 5])] = &[
    (2015, [0.0, 9_700.0, 26_791.0, 71_826.0, 151_956.0]),
    (2017, [0.0, 9_807.0, 27_086.0, 72_617.0, 153_783.0]),
    (2018, [0.0, 9_964.0, 27_519.0, 73_779.0, 156_244.0]),
    (2019, [0.0, 10_064.0, 27_794.0, 74_517.0, 157_806.0]),
];

fn dated(values: &[(i32, f64)]) -> ParameterNode {
    let parameter = values
        .iter()
        .filter_map(|(year, v)| NaiveDate::from_ymd_opt(*year, 1, 1).map(|d| (d, *v)))
        .fold(Parameter::new(), |p, (d, v)| p.with_value(d, v));
    ParameterNode::Parameter(parameter)
}

fn bareme() -> ParameterNode {
    let brackets = (0..BAREME_RATES.len())
        .map(|i| {
            let seuils: Vec<(i32, f64)> = BAREME_THRESHOLDS
                .iter()
                .map(|(year, thresholds)| (*year, thresholds[i]))
                .collect();
            ParameterNode::branch([
                ("seuil", dated(&seuils)),
                ("taux", dated(&[(2015, BAREME_RATES[i])])),
            ])
        })
        .collect();
    ParameterNode::Scale(brackets)
}

pub fn reference_parameters() -> ParameterTree {
    let mut root = IndexMap::new();
    root.insert(
        "impot_revenu".to_string(),
        ParameterNode::branch([
            ("abattement", ParameterNode::branch([("taux", dated(&[(2015, 0.10)]))])),
            ("bareme", bareme()),
            (
                "quotient_familial",
                ParameterNode::branch([
                    ("enfant_1_2", dated(&[(2015, 0.5)])),
                    ("enfant_3_plus", dated(&[(2015, 1.0)])),
                ]),
            ),
            (
                "plafond_qf",
                ParameterNode::branch([
                    (
                        "plafond_par_demi_part",
                        dated(&[(2015, 1_510.0), (2017, 1_512.0), (2018, 1_527.0), (2019, 1_551.0)]),
                    ),
                    (
                        "reduc_postplafond",
                        dated(&[(2015, 1_497.0), (2017, 1_507.0), (2018, 1_523.0), (2019, 1_547.0)]),
                    ),
                ]),
            ),
        ]),
    );
    root.insert(
        "prestations".to_string(),
        ParameterNode::branch([(
            "af",
            ParameterNode::branch([
                (
                    "bmaf",
                    dated(&[(2015, 406.21), (2017, 407.84), (2018, 413.16), (2019, 414.40)]),
                ),
                ("age_limite", dated(&[(2015, 20.0)])),
                (
                    "taux",
                    ParameterNode::branch([
                        ("deux_enfants", dated(&[(2015, 0.32)])),
                        ("enfant_supplementaire", dated(&[(2015, 0.41)])),
                    ]),
                ),
            ]),
        )]),
    );
    ParameterTree::new(root)
}

pub fn reference_legislation() -> Legislation {
    Legislation::new("reference", reference_parameters())
        .with_input("salaire_imposable", EntityKind::Person, 0.0)
        .with_input("age", EntityKind::Person, 0.0)
        .with_formula("revenu_imposable", EntityKind::Household, revenu_imposable)
        .with_formula("nb_parts", EntityKind::Household, nb_parts)
        .with_formula("impot_brut", EntityKind::Household, impot_brut)
        .with_formula("impot_revenu", EntityKind::Household, impot_revenu)
        .with_formula(
            "allocations_familiales",
            EntityKind::Household,
            allocations_familiales,
        )
        .with_formula("revenu_disponible", EntityKind::Household, revenu_disponible)
}

fn require_year(variable: &str, period: &Period) -> Result<(), SimulationError> {
    if period.is_year() {
        Ok(())
    } else {
        Err(SimulationError::UnsupportedPeriod {
            variable: variable.to_string(),
            period: *period,
        })
    }
}

fn members(household: &Household) -> impl Iterator<Item = &String> {
    household.adults.iter().chain(&household.children)
}

fn household_salaries(
    sim: &mut LegislationSimulation<'_>,
    period: &Period,
) -> Result<Vec<f64>, SimulationError> {
    let salaries = sim.calculate("salaire_imposable", period)?;
    Ok(sim
        .households()
        .map(|h| sim.sum_members(&salaries, members(h)))
        .collect())
}

fn revenu_imposable(
    sim: &mut LegislationSimulation<'_>,
    period: &Period,
) -> Result<Vec<f64>, SimulationError> {
    require_year("revenu_imposable", period)?;
    let abattement = sim.parameter("impot_revenu.abattement.taux", period)?;
    Ok(household_salaries(sim, period)?
        .into_iter()
        .map(|s| (s * (1.0 - abattement)).max(0.0))
        .collect())
}

fn adult_parts(household: &Household) -> f64 {
    household.adults.len().clamp(1, 2) as f64
}

fn nb_parts(sim: &mut LegislationSimulation<'_>, period: &Period) -> Result<Vec<f64>, SimulationError> {
    require_year("nb_parts", period)?;
    let first_two = sim.parameter("impot_revenu.quotient_familial.enfant_1_2", period)?;
    let further = sim.parameter("impot_revenu.quotient_familial.enfant_3_plus", period)?;
    Ok(sim
        .households()
        .map(|h| {
            let children = h.children.len();
            adult_parts(h)
                + first_two * children.min(2) as f64
                + further * children.saturating_sub(2) as f64
        })
        .collect())
}

fn brackets(
    sim: &LegislationSimulation<'_>,
    period: &Period,
) -> Result<Vec<(f64, f64)>, SimulationError> {
    let count = sim.parameters().scale_len("impot_revenu.bareme")?;
    (0..count)
        .map(|i| {
            Ok((
                sim.parameter(&format!("impot_revenu.bareme[{i}].seuil"), period)?,
                sim.parameter(&format!("impot_revenu.bareme[{i}].taux"), period)?,
            ))
        })
        .collect()
}

fn scale_tax(income: f64, brackets: &[(f64, f64)]) -> f64 {
    brackets
        .iter()
        .enumerate()
        .map(|(i, (threshold, rate))| {
            let ceiling = brackets.get(i + 1).map_or(f64::INFINITY, |(next, _)| *next);
            let taxed = income.min(ceiling) - threshold;
            taxed.max(0.0) * rate
        })
        .sum()
}

fn tax_with_parts(income: f64, parts: f64, brackets: &[(f64, f64)]) -> f64 {
    if parts <= 0.0 {
        return scale_tax(income, brackets);
    }
    parts * scale_tax(income / parts, brackets)
}

fn impot_brut(sim: &mut LegislationSimulation<'_>, period: &Period) -> Result<Vec<f64>, SimulationError> {
    require_year("impot_brut", period)?;
    let incomes = sim.calculate("revenu_imposable", period)?;
    let parts = sim.calculate("nb_parts", period)?;
    let scale = brackets(sim, period)?;
    Ok(incomes
        .iter()
        .zip(&parts)
        .map(|(income, parts)| tax_with_parts(*income, *parts, &scale))
        .collect())
}

fn impot_revenu(sim: &mut LegislationSimulation<'_>, period: &Period) -> Result<Vec<f64>, SimulationError> {
    require_year("impot_revenu", period)?;
    let incomes = sim.calculate("revenu_imposable", period)?;
    let parts = sim.calculate("nb_parts", period)?;
    let gross = sim.calculate("impot_brut", period)?;
    let scale = brackets(sim, period)?;
    let ceiling = sim.parameter("impot_revenu.plafond_qf.plafond_par_demi_part", period)?;
    let reduction = sim.parameter("impot_revenu.plafond_qf.reduc_postplafond", period)?;

    Ok(sim
        .households()
        .enumerate()
        .map(|(idx, household)| {
            let reference_parts = adult_parts(household);
            let reference_tax = tax_with_parts(incomes[idx], reference_parts, &scale);
            let extra_half_parts = ((parts[idx] - reference_parts) * 2.0).max(0.0);
            let cap = ceiling * extra_half_parts;

            let tax = if reference_tax - gross[idx] > cap {
                let capped = reference_tax - cap;
                let relief = (reduction * extra_half_parts).min(capped - gross[idx]);
                capped - relief
            } else {
                gross[idx]
            };
            tax.max(0.0)
        })
        .collect())
}

fn allocations_familiales(
    sim: &mut LegislationSimulation<'_>,
    period: &Period,
) -> Result<Vec<f64>, SimulationError> {
    require_year("allocations_familiales", period)?;
    let ages = sim.calculate("age", period)?;
    let bmaf = sim.parameter("prestations.af.bmaf", period)?;
    let age_limit = sim.parameter("prestations.af.age_limite", period)?;
    let two = sim.parameter("prestations.af.taux.deux_enfants", period)?;
    let each_further = sim.parameter("prestations.af.taux.enfant_supplementaire", period)?;

    Ok(sim
        .households()
        .map(|h| {
            let eligible = h
                .children
                .iter()
                .filter_map(|id| sim.person_index(id))
                .filter(|idx| ages.get(*idx).is_some_and(|age| *age < age_limit))
                .count();
            if eligible < 2 {
                return 0.0;
            }
            let rate = two + each_further * (eligible - 2) as f64;
            12.0 * bmaf * rate
        })
        .collect())
}

fn revenu_disponible(
    sim: &mut LegislationSimulation<'_>,
    period: &Period,
) -> Result<Vec<f64>, SimulationError> {
    require_year("revenu_disponible", period)?;
    let incomes = sim.calculate("revenu_imposable", period)?;
    let tax = sim.calculate("impot_revenu", period)?;
    let allowances = sim.calculate("allocations_familiales", period)?;
    Ok(incomes
        .iter()
        .zip(&tax)
        .zip(&allowances)
        .map(|((r, t), a)| r - t + a)
        .collect())
}
