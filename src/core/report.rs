use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::{debug, info};

use super::error::{RenderError, ReportError};
use super::legislation::SimulationFactory;
use super::types::{EntitySelector, Period, Scenario};

pub type RequestedOutputs = IndexMap<String, Vec<Period>>;

#[derive(Debug, Clone)]
pub struct ReformVariant<F> {
    pub name: String,
    pub legislation: F,
}

impl<F> ReformVariant<F> {
    pub fn new(name: impl Into<String>, legislation: F) -> Self {
        Self {
            name: name.into(),
            legislation,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AxisBuilder {
    periods: IndexSet<Period>,
}

impl AxisBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&mut self, period: Period) -> usize {
        let (idx, _) = self.periods.insert_full(period);
        idx + 1
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn into_labels(self) -> Vec<Period> {
        self.periods.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub position: usize,
    pub period: Period,
    pub value: f64,
    pub entity_values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartLine {
    pub label: String,
    pub variant: String,
    pub quantity: String,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub scenario: String,
    pub x_label: String,
    pub axis: Vec<Period>,
    pub lines: Vec<ChartLine>,
}

impl Chart {
    pub fn tick_positions(&self) -> Vec<usize> {
        (1..=self.axis.len()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedChart {
    pub scenario: String,
    pub location: String,
}

pub trait ChartSink {
    fn render(&mut self, chart: &Chart) -> Result<RenderedChart, RenderError>;
}

pub fn build_chart<F: SimulationFactory>(
    scenario_name: &str,
    scenario: &Scenario,
    variants: &[ReformVariant<F>],
    outputs: &RequestedOutputs,
    selector: EntitySelector,
) -> Result<Chart, ReportError> {
    let mut axis = AxisBuilder::new();
    let mut lines = Vec::with_capacity(variants.len() * outputs.len());

    for variant in variants {
        let mut simulation =
            variant
                .legislation
                .instantiate(scenario)
                .map_err(|source| ReportError::Instantiate {
                    scenario: scenario_name.to_string(),
                    variant: variant.name.clone(),
                    source,
                })?;

        for (quantity, periods) in outputs {
            let mut points = Vec::with_capacity(periods.len());
            for period in periods {
                let position = axis.position(*period);
                let entity_values = simulation.calculate(quantity, period).map_err(|source| {
                    ReportError::Calculate {
                        scenario: scenario_name.to_string(),
                        variant: variant.name.clone(),
                        quantity: quantity.clone(),
                        period: *period,
                        source,
                    }
                })?;
                let value = selector
                    .select(&entity_values)
                    .map_err(|source| ReportError::Select {
                        scenario: scenario_name.to_string(),
                        variant: variant.name.clone(),
                        quantity: quantity.clone(),
                        period: *period,
                        source,
                    })?;
                points.push(SeriesPoint {
                    position,
                    period: *period,
                    value,
                    entity_values,
                });
            }

            debug!(
                scenario = scenario_name,
                variant = %variant.name,
                quantity = %quantity,
                points = points.len(),
                "series computed"
            );
            lines.push(ChartLine {
                label: format!("{}.{}", variant.name, quantity),
                variant: variant.name.clone(),
                quantity: quantity.clone(),
                points,
            });
        }
    }

    Ok(Chart {
        scenario: scenario_name.to_string(),
        x_label: "periods".to_string(),
        axis: axis.into_labels(),
        lines,
    })
}

/// Builds and renders one chart per scenario, in scenario order. The first failure stops
/// the run; the failing scenario is never handed to the sink.
pub fn generate_report<F: SimulationFactory>(
    scenarios: &IndexMap<String, Scenario>,
    variants: &[ReformVariant<F>],
    outputs: &RequestedOutputs,
    selector: EntitySelector,
    sink: &mut dyn ChartSink,
) -> Result<Vec<RenderedChart>, ReportError> {
    let mut rendered = Vec::with_capacity(scenarios.len());
    for (name, scenario) in scenarios {
        let chart = build_chart(name, scenario, variants, outputs, selector)?;
        let output = sink.render(&chart).map_err(|source| ReportError::Render {
            scenario: name.clone(),
            source,
        })?;
        info!(
            scenario = %name,
            lines = chart.lines.len(),
            location = %output.location,
            "chart rendered"
        );
        rendered.push(output);
    }
    Ok(rendered)
}
