//! Server-rendered color table.

use std::fmt::Write as _;
use valuation_engine::DisplayGrid;

fn escape(text: &str) -> String {
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

pub fn render_page(grid: &DisplayGrid, export_href: &str) -> String {
    let mut html = String::new();
    html.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Valuation Metrics Dashboard</title>\n\
         <style>body{font-family:sans-serif;margin:2rem}table{border-collapse:collapse}\
         th,td{border:1px solid #ccc;padding:4px 10px;text-align:right}th:first-child,td:first-child{text-align:left}</style>\n\
         </head>\n<body>\n<h1>Valuation Metrics Dashboard</h1>\n<h2>Valuation Table with Highlights</h2>\n",
    );
    html.push_str(&render_table(grid));
    let _ = write!(
        html,
        "<p><a href=\"{}\" download>Download spreadsheet</a></p>\n</body>\n</html>\n",
        escape(export_href)
    );
    html
}

pub fn render_table(grid: &DisplayGrid) -> String {
    let mut html = String::from("<table>\n<thead><tr><th>Ticker</th>");
    for header in &grid.headers {
        let _ = write!(html, "<th>{}</th>", escape(header));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in &grid.rows {
        let _ = write!(html, "<tr><td>{}</td>", escape(&row.entity));
        for cell in &row.cells {
            match cell.color {
                Some(color) => {
                    let _ = write!(html, "<td style=\"{}\">{}</td>", color.background_style(), escape(&cell.text));
                }
                None => {
                    let _ = write!(html, "<td>{}</td>", escape(&cell.text));
                }
            }
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>\n");
    html
}
