use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use plotly::common::{Font, Mode, Title};
use plotly::layout::{Axis, Legend};
use plotly::{Layout, Plot, Scatter};
use tracing::debug;

use crate::core::{Chart, ChartSink, RenderError, RenderedChart};

const FIGURE_WIDTH: usize = 1200;
const FIGURE_HEIGHT: usize = 800;
const TICK_FONT_SIZE: usize = 9;

pub fn output_stem(scenario: &str) -> String {
    let stem: String = scenario
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "scenario".to_string()
    } else {
        stem
    }
}

pub fn build_plot(chart: &Chart) -> Plot {
    let mut plot = Plot::new();
    for line in &chart.lines {
        let x: Vec<usize> = line.points.iter().map(|p| p.position).collect();
        let y: Vec<f64> = line.points.iter().map(|p| p.value).collect();
        plot.add_trace(Scatter::new(x, y).mode(Mode::LinesMarkers).name(&line.label));
    }

    let tick_values: Vec<f64> = chart.tick_positions().into_iter().map(|p| p as f64).collect();
    let tick_text: Vec<String> = chart.axis.iter().map(ToString::to_string).collect();
    let x_axis = Axis::new()
        .title(Title::new(&chart.x_label))
        .tick_values(tick_values)
        .tick_text(tick_text)
        .tick_angle(-30.0)
        .tick_font(Font::new().size(TICK_FONT_SIZE));

    plot.set_layout(
        Layout::new()
            .title(Title::new(&chart.scenario))
            .width(FIGURE_WIDTH)
            .height(FIGURE_HEIGHT)
            .x_axis(x_axis)
            .legend(Legend::new().x(1.0).y(1.0)),
    );
    plot
}

pub struct PlotlyHtmlSink {
    output_dir: PathBuf,
    show: bool,
    taken: HashSet<String>,
}

impl PlotlyHtmlSink {
    pub fn new(output_dir: impl Into<PathBuf>, show: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            show,
            taken: HashSet::new(),
        }
    }

    fn unique_stem(&mut self, scenario: &str) -> String {
        let base = output_stem(scenario);
        let mut candidate = base.clone();
        let mut n = 1;
        while self.taken.contains(&candidate) {
            n += 1;
            candidate = format!("{base}-{n}");
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

impl ChartSink for PlotlyHtmlSink {
    fn render(&mut self, chart: &Chart) -> Result<RenderedChart, RenderError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| RenderError::Io {
            path: self.output_dir.display().to_string(),
            source,
        })?;

        let stem = self.unique_stem(&chart.scenario);
        let path = self.output_dir.join(format!("{stem}.html"));
        let plot = build_plot(chart);
        fs::write(&path, plot.to_html()).map_err(|source| RenderError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "chart written");

        if self.show {
            plot.show();
        }

        Ok(RenderedChart {
            scenario: chart.scenario.clone(),
            location: path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChartLine, Period, SeriesPoint};

    fn chart(scenario: &str) -> Chart {
        let p = |y| Period::year(y).unwrap();
        Chart {
            scenario: scenario.to_string(),
            x_label: "periods".to_string(),
            axis: vec![p(2017), p(2018)],
            lines: vec![ChartLine {
                label: "actuel.impot_revenu".to_string(),
                variant: "actuel".to_string(),
                quantity: "impot_revenu".to_string(),
                points: vec![
                    SeriesPoint {
                        position: 1,
                        period: p(2017),
                        value: 1200.0,
                        entity_values: vec![1200.0],
                    },
                    SeriesPoint {
                        position: 2,
                        period: p(2018),
                        value: 1300.0,
                        entity_values: vec![1300.0],
                    },
                ],
            }],
        }
    }

    #[test]
    fn output_stem_replaces_unsafe_characters() {
        assert_eq!(output_stem("couple 2 enfants"), "couple_2_enfants");
        assert_eq!(output_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(output_stem("a-b_c"), "a-b_c");
        assert_eq!(output_stem(""), "scenario");
    }

    #[test]
    fn sink_writes_one_file_per_scenario_without_overwriting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = PlotlyHtmlSink::new(dir.path().join("charts"), false);

        let first = sink.render(&chart("couple/1")).expect("render");
        let second = sink.render(&chart("couple 1")).expect("render");
        let third = sink.render(&chart("single")).expect("render");

        assert!(first.location.ends_with("couple_1.html"));
        assert!(second.location.ends_with("couple_1-2.html"));
        assert!(third.location.ends_with("single.html"));
        for rendered in [&first, &second, &third] {
            let html = fs::read_to_string(&rendered.location).expect("chart file");
            assert!(html.contains("actuel.impot_revenu"));
        }
    }

    #[test]
    fn plot_has_one_trace_per_line() {
        let mut c = chart("s");
        let mut extra = c.lines[0].clone();
        extra.label = "reforme.impot_revenu".to_string();
        c.lines.push(extra);
        let json = build_plot(&c).to_json();
        assert!(json.contains("actuel.impot_revenu"));
        assert!(json.contains("reforme.impot_revenu"));
        assert!(json.contains("2018"));
    }
}
