//! Turns a snapshot into the broadcast banner.
//!
//! The template is an ordinary HTML file with a named slot: everything
//! between the begin and end markers is replaced by one fragment per
//! station. The markers themselves are kept, so a rendered banner is also a
//! valid template.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};

use crate::{
    config::{Config, PathsConfig, RenderConfig},
    error::{RenderError, StoreError},
    model::{Measurement, Snapshot, StationConfig, StationResult},
    rounding::round_half_up,
    store,
};

/// Starter template written by `banner configure`.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/banner.html");

const NO_DATA_TEXT: &str = "Sense dades disponibles";

/// A template split around its slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    head: String,
    tail: String,
}

impl Template {
    /// Split `text` at the slot. Each marker must appear exactly once and
    /// the begin marker must come first.
    pub fn parse(text: &str, begin_marker: &str, end_marker: &str) -> Result<Self, RenderError> {
        for marker in [begin_marker, end_marker] {
            match text.matches(marker).count() {
                0 => return Err(RenderError::MarkerMissing(marker.to_string())),
                1 => {}
                count => {
                    return Err(RenderError::MarkerRepeated { marker: marker.to_string(), count });
                }
            }
        }

        let (Some(begin), Some(end)) = (text.find(begin_marker), text.find(end_marker)) else {
            return Err(RenderError::MarkerMissing(begin_marker.to_string()));
        };
        let slot_start = begin + begin_marker.len();
        if end < slot_start {
            return Err(RenderError::MarkersOutOfOrder);
        }

        Ok(Self { head: text[..slot_start].to_string(), tail: text[end..].to_string() })
    }

    pub fn load(path: &Path, render: &RenderConfig) -> Result<Self, RenderError> {
        let text = store::read_to_string(path).map_err(|e| match e {
            StoreError::NotFound(p) => RenderError::TemplateMissing(p),
            other => RenderError::Store(other),
        })?;
        Self::parse(&text, &render.begin_marker, &render.end_marker)
    }

    /// The template with `content` in the slot.
    pub fn fill(&self, content: &str) -> String {
        if content.is_empty() {
            format!("{}\n{}", self.head, self.tail)
        } else {
            format!("{}\n{}\n{}", self.head, content, self.tail)
        }
    }
}

pub struct Renderer<'a> {
    stations: &'a [StationConfig],
    render: &'a RenderConfig,
    offset: FixedOffset,
}

impl<'a> Renderer<'a> {
    pub fn new(config: &'a Config) -> Result<Self, RenderError> {
        let offset = config
            .render
            .offset()
            .ok_or(RenderError::InvalidOffset(config.render.utc_offset_minutes))?;

        Ok(Self { stations: &config.stations, render: &config.render, offset })
    }

    /// Render `snapshot` into `template` as of `now`. Stations appear in
    /// configured order; with no successful station at all, a single
    /// "no data" fragment is shown instead.
    pub fn render(&self, template: &Template, snapshot: Option<&Snapshot>, now: DateTime<Utc>) -> String {
        let footer = self.update_text(now);

        let content = match snapshot.filter(|s| s.has_successes()) {
            Some(snapshot) => self
                .stations
                .iter()
                .map(|station| self.station_fragment(station, snapshot.get(&station.code), &footer))
                .collect::<Vec<_>>()
                .join("\n"),
            None => self.no_data_fragment(&footer),
        };

        template.fill(&content)
    }

    /// "Actualitzat a les HH:MM – DD/MM/YYYY" in the configured civil time.
    pub fn update_text(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.offset);
        format!("Actualitzat a les {} – {}", local.format("%H:%M"), local.format("%d/%m/%Y"))
    }

    fn station_fragment(
        &self,
        station: &StationConfig,
        result: Option<&StationResult>,
        footer: &str,
    ) -> String {
        let values = result.filter(|r| r.success).map(|r| r.values).unwrap_or_default();
        let name = escape_html(&station.display_name);

        format!(
            r#"            <!-- GRUP: {name} -->
            <div class="content-group" id="group{code}">
                <div class="location-header">
                    <div class="location-name">{name}</div>
                </div>
                <div class="data-container">
                    <div class="data-box">
                        <div class="data-title br-2">Temperatura<br>màxima del dia</div>
                        <div class="data-value">{tx}</div>
                    </div>
                    <div class="data-box">
                        <div class="data-title br-2">Temperatura<br>mínima del dia</div>
                        <div class="data-value">{tn}</div>
                    </div>
                    <div class="data-box">
                        <div class="data-title">Pluja acumulada</div>
                        <div class="data-value">{ppt}</div>
                    </div>
                </div>
                <div class="footer">
                    <div class="update-info">{footer}</div>
                    <div class="source">{source}</div>
                </div>
            </div>"#,
            code = station.code,
            tx = format_reading(values.tx, "°C"),
            tn = format_reading(values.tn, "°C"),
            ppt = format_reading(values.ppt, "mm"),
            source = escape_html(&self.render.source_label),
        )
    }

    fn no_data_fragment(&self, footer: &str) -> String {
        format!(
            r#"            <div class="content-group no-data">
                <div class="location-header">
                    <div class="location-name">{NO_DATA_TEXT}</div>
                </div>
                <div class="footer">
                    <div class="update-info">{footer}</div>
                    <div class="source">{source}</div>
                </div>
            </div>"#,
            source = escape_html(&self.render.source_label),
        )
    }
}

/// `11.8°C`, `0.6mm`, or `-` when absent.
pub fn format_reading(value: Measurement, unit: &str) -> String {
    match value {
        Measurement::Value(v) => format!("{:.1}{unit}", round_half_up(v, 1)),
        Measurement::Missing => crate::model::SENTINEL.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Load the template, render, and return the document. Nothing is written.
pub fn render_banner(
    config: &Config,
    snapshot: Option<&Snapshot>,
    now: DateTime<Utc>,
) -> Result<String, RenderError> {
    let template = Template::load(&config.paths.template, &config.render)?;
    let renderer = Renderer::new(config)?;
    Ok(renderer.render(&template, snapshot, now))
}

/// Write the rendered banner to the output path and its mirror.
pub fn write_outputs(html: &str, paths: &PathsConfig) -> Result<Vec<PathBuf>, StoreError> {
    let mut written = vec![paths.output.clone()];
    store::write_atomic(&paths.output, html.as_bytes())?;

    if let Some(mirror) = &paths.mirror {
        store::write_atomic(mirror, html.as_bytes())?;
        written.push(mirror.clone());
    }

    Ok(written)
}
