use crate::error::AppError;
use crate::session::SessionState;

pub const PAGE_TITLE: &str = "Natural Language to SQL Converter";

/// Everything one render of the page needs.
pub struct Page<'a> {
    pub state: &'a SessionState,
    pub user_input: &'a str,
    pub error: Option<&'a AppError>,
}

impl Page<'_> {
    pub fn render(&self) -> String {
        let error = match self.error {
            Some(e) => format!(
                "<div class=\"error\" role=\"alert\">Could not generate a query: {}</div>\n",
                escape_html(&e.to_string())
            ),
            None => String::new(),
        };
        let disabled = if self.state.can_run() { "" } else { " disabled" };

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; max-width: 48rem; margin: 2rem auto; }}
textarea, input[type=text] {{ width: 100%; box-sizing: border-box; }}
textarea {{ min-height: 6rem; font-family: monospace; }}
.error {{ background: #fdecea; color: #611a15; padding: 0.5rem; margin: 1rem 0; }}
</style>
</head>
<body>
<h1>{title}</h1>
<form method="post" action="/submit">
<label for="user_input">Enter question</label>
<input type="text" id="user_input" name="question" value="{user_input}">
<button type="submit">Submit</button>
</form>
{error}<label for="query_box">Query</label>
<textarea id="query_box" readonly>{query}</textarea>
<form method="post" action="/run">
<input type="hidden" name="question" value="{user_input}">
<button type="submit" id="query_submit"{disabled}>Run query</button>
</form>
<label for="result_box">Result</label>
<textarea id="result_box" readonly>{result}</textarea>
</body>
</html>
"#,
            title = PAGE_TITLE,
            user_input = escape_html(self.user_input),
            error = error,
            query = escape_html(self.state.query()),
            disabled = disabled,
            result = escape_html(self.state.result()),
        )
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
