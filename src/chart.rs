//! Bar-chart rendering for reports: plain text for the terminal and SVG for
//! the viewer.

use crate::report::Report;

/// Width of the longest text bar, in characters.
const TEXT_BAR_WIDTH: usize = 40;
#[cfg(feature = "serve")]
const SVG_WIDTH: usize = 960;
#[cfg(feature = "serve")]
const SVG_ROW_HEIGHT: usize = 22;
#[cfg(feature = "serve")]
const SVG_LABEL_WIDTH: usize = 520;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub label: String,
    pub value: usize,
}

impl Bar {
    pub fn new(label: impl Into<String>, value: usize) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// A titled, already-ranked chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    pub title: String,
    pub bars: Vec<Bar>,
}

/// Charts for every table in the report, each cut to `top_n` bars.
pub fn report_charts(report: &Report, top_n: usize) -> Vec<Chart> {
    let mut charts = vec![
        Chart {
            title: "Sessions by hostname".to_string(),
            bars: report
                .sessions_by_host
                .iter()
                .map(|r| Bar::new(&r.hostname, r.sessions))
                .collect(),
        },
        Chart {
            title: "Sessions by page".to_string(),
            bars: report
                .sessions_by_page
                .iter()
                .map(|r| Bar::new(format!("{}{}", r.hostname, r.page_path), r.sessions))
                .collect(),
        },
        Chart {
            title: "Sessions by journey".to_string(),
            bars: report
                .journeys
                .iter()
                .map(|r| Bar::new(&r.journey, r.sessions))
                .collect(),
        },
        Chart {
            title: "Distinct pages by hostname".to_string(),
            bars: report
                .pages_per_host
                .iter()
                .map(|r| Bar::new(&r.hostname, r.pages))
                .collect(),
        },
        Chart {
            title: "Sessions by page transition".to_string(),
            bars: report
                .transitions
                .iter()
                .map(|r| Bar::new(format!("{} -> {}", r.source, r.destination), r.sessions))
                .collect(),
        },
    ];

    for host in &report.hosts {
        charts.push(Chart {
            title: format!("Top pages on {}", host.hostname),
            bars: host
                .pages
                .iter()
                .map(|r| Bar::new(&r.page_path, r.sessions))
                .collect(),
        });
    }

    for chart in &mut charts {
        chart.bars.truncate(top_n);
    }
    charts
}

/// Render one chart as text: right-aligned counts and `#` bars scaled to
/// the largest value.
pub fn render_text(chart: &Chart) -> String {
    let mut lines = vec![chart.title.clone(), "-".repeat(chart.title.len())];
    if chart.bars.is_empty() {
        lines.push("(no rows)".to_string());
        return lines.join("\n");
    }

    let max = chart.bars.iter().map(|b| b.value).max().unwrap_or(0).max(1);
    let count_width = max.to_string().len();
    for bar in &chart.bars {
        let len = (bar.value * TEXT_BAR_WIDTH).div_ceil(max);
        lines.push(format!(
            "{:>count_width$} {:<TEXT_BAR_WIDTH$} {}",
            bar.value,
            "#".repeat(len),
            bar.label
        ));
    }
    lines.join("\n")
}

/// Render the whole report for the terminal.
pub fn render_report_text(report: &Report, top_n: usize) -> String {
    let mut sections = vec![format!(
        "{} sessions, {} hits",
        report.sessions, report.hits
    )];
    sections.extend(report_charts(report, top_n).iter().map(render_text));
    sections.join("\n\n")
}

/// Render one chart as a standalone SVG horizontal bar chart.
#[cfg(feature = "serve")]
pub fn render_svg(chart: &Chart) -> String {
    let rows = chart.bars.len().max(1);
    let height = (rows + 2) * SVG_ROW_HEIGHT;
    let bar_space = SVG_WIDTH - SVG_LABEL_WIDTH - 60;
    let max = chart.bars.iter().map(|b| b.value).max().unwrap_or(0).max(1);

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{SVG_WIDTH}\" height=\"{height}\" font-family=\"sans-serif\" font-size=\"12\">\n"
    );
    svg.push_str(&format!(
        "<text x=\"4\" y=\"{}\" font-weight=\"bold\">{}</text>\n",
        SVG_ROW_HEIGHT - 6,
        escape_xml(&chart.title)
    ));

    for (i, bar) in chart.bars.iter().enumerate() {
        let y = (i + 1) * SVG_ROW_HEIGHT;
        let width = (bar.value * bar_space).div_ceil(max);
        svg.push_str(&format!(
            "<text x=\"{}\" y=\"{}\" text-anchor=\"end\">{}</text>\n",
            SVG_LABEL_WIDTH - 8,
            y + 15,
            escape_xml(&truncate_label(&bar.label, 80))
        ));
        svg.push_str(&format!(
            "<rect x=\"{SVG_LABEL_WIDTH}\" y=\"{}\" width=\"{width}\" height=\"{}\" fill=\"#1d70b8\"/>\n",
            y + 3,
            SVG_ROW_HEIGHT - 6
        ));
        svg.push_str(&format!(
            "<text x=\"{}\" y=\"{}\">{}</text>\n",
            SVG_LABEL_WIDTH + width + 6,
            y + 15,
            bar.value
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Keep long journey labels readable: first `max` characters plus an ellipsis.
#[cfg(feature = "serve")]
fn truncate_label(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        return label.to_string();
    }
    let mut out: String = label.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(feature = "serve")]
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::Hit;
    use chrono::DateTime;

    fn chart() -> Chart {
        Chart {
            title: "Sessions by hostname".to_string(),
            bars: vec![Bar::new("www.gov.uk", 10), Bar::new("account.gov.uk", 5)],
        }
    }

    #[test]
    fn text_bars_scale_to_largest() {
        let text = render_text(&chart());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Sessions by hostname");
        assert_eq!(lines[2].matches('#').count(), TEXT_BAR_WIDTH);
        assert_eq!(lines[3].matches('#').count(), TEXT_BAR_WIDTH / 2);
        assert!(lines[2].starts_with("10 "));
        assert!(lines[3].starts_with(" 5 "));
        assert!(lines[3].ends_with("account.gov.uk"));
    }

    #[test]
    fn empty_chart_says_so() {
        let text = render_text(&Chart {
            title: "Empty".to_string(),
            bars: Vec::new(),
        });
        assert!(text.ends_with("(no rows)"));
    }

    #[cfg(feature = "serve")]
    #[test]
    fn svg_escapes_labels() {
        let svg = render_svg(&Chart {
            title: "Pages <top>".to_string(),
            bars: vec![Bar::new("/search?q=a&b", 3)],
        });
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("Pages &lt;top&gt;"));
        assert!(svg.contains("/search?q=a&amp;b"));
        assert_eq!(svg.matches("<rect").count(), 1);
    }

    #[cfg(feature = "serve")]
    #[test]
    fn long_labels_are_truncated() {
        let label = "/a".repeat(100);
        let out = truncate_label(&label, 10);
        assert_eq!(out.chars().count(), 11);
        assert!(out.ends_with('…'));
        assert_eq!(truncate_label("/short", 10), "/short");
    }

    #[test]
    fn report_charts_cover_tables_and_hosts() {
        let hits: Vec<Hit> = ["www.gov.uk", "account.gov.uk", "www.gov.uk"]
            .iter()
            .enumerate()
            .map(|(i, host)| Hit {
                session_id: "s1".to_string(),
                client_id: "c".to_string(),
                hit_number: i as i64 + 1,
                timestamp: DateTime::default(),
                page_path: format!("/p{i}"),
                hostname: host.to_string(),
                row_number: i as u32 + 1,
            })
            .collect();
        let report = Report::build(&hits);

        let charts = report_charts(&report, 1);
        // five tables plus one per host
        assert_eq!(charts.len(), 7);
        assert!(charts.iter().all(|c| c.bars.len() <= 1));
        assert_eq!(charts[5].title, "Top pages on account.gov.uk");

        let text = render_report_text(&report, 10);
        assert!(text.starts_with("1 sessions, 3 hits"));
        assert!(text.contains("/p0,/p1,/p2"));
    }
}
