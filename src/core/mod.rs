mod error;
mod legislation;
mod parameters;
mod reference;
mod reform;
mod report;
mod types;

pub use error::{ParameterError, RenderError, ReportError, SelectionError, SimulationError};
pub use legislation::{
    EntityKind, Formula, Legislation, LegislationSimulation, Simulation, SimulationFactory,
};
pub use parameters::{Parameter, ParameterNode, ParameterPath, ParameterTree};
pub use reference::{reference_legislation, reference_parameters};
pub use reform::{BUILTIN_REFORMS, ParameterOverride, Reform, ReformSet, builtin_reform};
pub use report::{
    AxisBuilder, Chart, ChartLine, ChartSink, ReformVariant, RenderedChart, RequestedOutputs,
    SeriesPoint, build_chart, generate_report,
};
pub use types::{EntitySelector, Household, InputValue, Period, Scenario};
