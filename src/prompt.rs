//! Prompt rendering for SQL generation.
//!
//! The system message carries the dialect-aware authoring rules and the
//! two-phase "First draft / Final answer" output format. The human message is
//! the caller's question, passed through untouched.

/// Default number of rows the model is asked to limit its query to.
pub const DEFAULT_TOP_K: usize = 5;

const SYSTEM_TEMPLATE: &str = r#"
You are a {dialect} expert. Given an input question, create a syntactically correct
{dialect} query to run. Unless the user specifies in the question a specific number of
examples to obtain, query for at most {top_k} results using the LIMIT clause as per
{dialect}. You can order results to return the most informative data in the database.
Never query for all columns from a table. You must query only the columns that are
needed to answer the question. Wrap each column name in double quotes (") to denote them
as delimited identifiers. Pay attention to use only the column names you can see in the
tables below. Be careful to not query for columns that do not exist. Also, pay attention
to which column is in which table. Pay attention to use date('now') function to get the
current date, if the question involves "today".

Only use the following tables:
{table_info}

Write an initial draft of the query. Then double check the {dialect} query for common
mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

Use format:

First draft: <<FIRST_DRAFT_QUERY>>
Final answer: <<FINAL_ANSWER_QUERY>>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    Human,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }
}

/// Template with `dialect`, `top_k` and `table_info` bound up front; only the
/// question varies between renders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    dialect: String,
    top_k: usize,
    table_info: String,
}

impl PromptTemplate {
    pub fn new(dialect: impl Into<String>, table_info: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            top_k: DEFAULT_TOP_K,
            table_info: table_info.into(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn render(&self, question: &str) -> Vec<PromptMessage> {
        // Single pass so placeholder-looking text inside table_info is left alone.
        let system = fill(
            SYSTEM_TEMPLATE,
            &[
                ("dialect", self.dialect.as_str()),
                ("top_k", &self.top_k.to_string()),
                ("table_info", self.table_info.as_str()),
            ],
        );

        vec![PromptMessage::system(system), PromptMessage::human(question)]
    }
}

fn fill(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            slots
                .iter()
                .find(|(slot, _)| *slot == name)
                .map(|(_, value)| (*value, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
