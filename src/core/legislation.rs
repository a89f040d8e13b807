use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use super::error::{ParameterError, SimulationError};
use super::parameters::ParameterTree;
use super::reform::Reform;
use super::types::{Household, Period, Scenario};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntityKind {
    Person,
    Household,
}

pub type Formula = fn(&mut LegislationSimulation<'_>, &Period) -> Result<Vec<f64>, SimulationError>;

#[derive(Clone, Copy)]
pub enum VariableKind {
    Input { default: f64 },
    Formula(Formula),
}

#[derive(Clone)]
pub struct Variable {
    pub entity: EntityKind,
    pub kind: VariableKind,
}

#[derive(Clone)]
pub struct Legislation {
    name: String,
    parameters: ParameterTree,
    variables: IndexMap<String, Variable>,
}

impl Legislation {
    pub fn new(name: impl Into<String>, parameters: ParameterTree) -> Self {
        Self {
            name: name.into(),
            parameters,
            variables: IndexMap::new(),
        }
    }

    pub fn with_input(mut self, name: &str, entity: EntityKind, default: f64) -> Self {
        self.variables.insert(
            name.to_string(),
            Variable {
                entity,
                kind: VariableKind::Input { default },
            },
        );
        self
    }

    pub fn with_formula(mut self, name: &str, entity: EntityKind, formula: Formula) -> Self {
        self.variables.insert(
            name.to_string(),
            Variable {
                entity,
                kind: VariableKind::Formula(formula),
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &ParameterTree {
        &self.parameters
    }

    pub fn replace_parameters(mut self, parameters: ParameterTree) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn apply_reform(mut self, reform: &dyn Reform) -> Result<Self, ParameterError> {
        reform.apply(&mut self.parameters)?;
        debug!(legislation = %self.name, reform = reform.name(), "reform applied");
        self.name = format!("{}+{}", self.name, reform.name());
        Ok(self)
    }

    fn check_scenario(&self, scenario: &Scenario) -> Result<(), SimulationError> {
        for (household_id, household) in &scenario.households {
            for person in household.adults.iter().chain(&household.children) {
                if !scenario.persons.contains_key(person) {
                    return Err(SimulationError::UnknownPerson {
                        household: household_id.clone(),
                        person: person.clone(),
                    });
                }
            }
        }

        for (person_id, inputs) in &scenario.persons {
            for variable in inputs.keys() {
                let accepted = matches!(
                    self.variables.get(variable),
                    Some(Variable {
                        entity: EntityKind::Person,
                        kind: VariableKind::Input { .. },
                    })
                );
                if !accepted {
                    return Err(SimulationError::InvalidInput {
                        variable: variable.clone(),
                        entity: person_id.clone(),
                        reason: "not a person input of this legislation".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

pub trait Simulation {
    fn calculate(&mut self, quantity: &str, period: &Period) -> Result<Vec<f64>, SimulationError>;
}

pub trait SimulationFactory {
    fn instantiate<'a>(
        &'a self,
        scenario: &'a Scenario,
    ) -> Result<Box<dyn Simulation + 'a>, SimulationError>;
}

impl SimulationFactory for Legislation {
    fn instantiate<'a>(
        &'a self,
        scenario: &'a Scenario,
    ) -> Result<Box<dyn Simulation + 'a>, SimulationError> {
        self.check_scenario(scenario)?;
        Ok(Box::new(LegislationSimulation::new(self, scenario)))
    }
}

pub struct LegislationSimulation<'a> {
    legislation: &'a Legislation,
    scenario: &'a Scenario,
    cache: HashMap<(String, Period), Vec<f64>>,
    in_flight: Vec<(String, Period)>,
}

impl<'a> LegislationSimulation<'a> {
    pub fn new(legislation: &'a Legislation, scenario: &'a Scenario) -> Self {
        Self {
            legislation,
            scenario,
            cache: HashMap::new(),
            in_flight: Vec::new(),
        }
    }

    pub fn parameter(&self, path: &str, period: &Period) -> Result<f64, SimulationError> {
        Ok(self.legislation.parameters.value_at(path, period.start())?)
    }

    pub fn parameters(&self) -> &ParameterTree {
        &self.legislation.parameters
    }

    pub fn households(&self) -> impl Iterator<Item = &'a Household> + use<'a> {
        self.scenario.households.values()
    }

    pub fn person_index(&self, person: &str) -> Option<usize> {
        self.scenario.persons.get_index_of(person)
    }

    pub fn sum_members<'m>(
        &self,
        person_values: &[f64],
        members: impl IntoIterator<Item = &'m String>,
    ) -> f64 {
        members
            .into_iter()
            .filter_map(|id| self.person_index(id))
            .filter_map(|idx| person_values.get(idx))
            .sum()
    }

    fn entity_count(&self, entity: EntityKind) -> usize {
        match entity {
            EntityKind::Person => self.scenario.persons.len(),
            EntityKind::Household => self.scenario.households.len(),
        }
    }

    fn input_values(&self, name: &str, entity: EntityKind, default: f64, period: &Period) -> Vec<f64> {
        match entity {
            EntityKind::Person => self
                .scenario
                .persons
                .values()
                .map(|inputs| {
                    inputs
                        .get(name)
                        .and_then(|v| v.value_for(period))
                        .unwrap_or(default)
                })
                .collect(),
            EntityKind::Household => vec![default; self.entity_count(entity)],
        }
    }
}

impl Simulation for LegislationSimulation<'_> {
    fn calculate(&mut self, quantity: &str, period: &Period) -> Result<Vec<f64>, SimulationError> {
        let key = (quantity.to_string(), *period);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let variable = self
            .legislation
            .variable(quantity)
            .cloned()
            .ok_or_else(|| SimulationError::UnknownVariable(quantity.to_string()))?;

        let values = match variable.kind {
            VariableKind::Input { default } => {
                self.input_values(quantity, variable.entity, default, period)
            }
            VariableKind::Formula(formula) => {
                if self.in_flight.contains(&key) {
                    return Err(SimulationError::Cycle {
                        variable: quantity.to_string(),
                        period: *period,
                    });
                }
                self.in_flight.push(key.clone());
                let result = formula(self, period);
                self.in_flight.pop();
                result?
            }
        };

        debug!(variable = quantity, %period, count = values.len(), "calculated");
        self.cache.insert(key, values.clone());
        Ok(values)
    }
}
