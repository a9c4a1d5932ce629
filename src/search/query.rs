/// Form fields sent with every search and summary request
const STATIC_FIELDS: [(&str, &str); 5] = [
    ("product", "UA"),
    ("parentProduct", "UA"),
    ("search_mode", "GeneralSearch"),
    ("period", "Range Selection"),
    ("range", "ALL"),
];

/// Searchable portal fields, by their two-letter tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Title,
    Doi,
    Author,
}

impl SearchField {
    pub fn tag(&self) -> &'static str {
        match self {
            SearchField::Title => "TI",
            SearchField::Doi => "DO",
            SearchField::Author => "AU",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    fn as_str(&self) -> &'static str {
        match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        }
    }
}

/// A search description, independent of any session.
///
/// The session ID is only bound in [`SearchForm::to_form`], when the query is
/// actually submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchForm {
    terms: Vec<(SearchField, String)>,
    operator: BoolOp,
}

impl SearchForm {
    pub fn new(terms: Vec<(SearchField, String)>, operator: BoolOp) -> Self {
        Self { terms, operator }
    }

    /// Many values of one field glued with OR, skipping empty values
    pub fn any_of<'a>(field: SearchField, values: impl IntoIterator<Item = &'a str>) -> Self {
        let terms = values
            .into_iter()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| (field, v.to_string()))
            .collect();
        Self::new(terms, BoolOp::Or)
    }

    pub fn author_pair(first: &str, second: &str) -> Self {
        Self::new(
            vec![
                (SearchField::Author, first.to_string()),
                (SearchField::Author, second.to_string()),
            ],
            BoolOp::And,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[(SearchField, String)] {
        &self.terms
    }

    /// POST body for the search endpoint
    pub fn to_form(&self, sid: &str) -> Vec<(String, String)> {
        let mut form = static_fields();
        form.push(("action".into(), "search".into()));
        form.push(("SID".into(), sid.to_string()));
        form.push(("fieldCount".into(), self.terms.len().to_string()));

        for (i, (field, value)) in self.terms.iter().enumerate() {
            form.push((format!("value(select{})", i + 1), field.tag().to_string()));
            form.push((format!("value(input{})", i + 1), value.clone()));
        }
        for i in 1..self.terms.len() {
            form.push((
                format!("value(bool_{}_{})", i, i + 1),
                self.operator.as_str().to_string(),
            ));
        }
        form
    }
}

fn static_fields() -> Vec<(String, String)> {
    STATIC_FIELDS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Query string that switches a result list to `page_size` items per page
pub fn page_size_params(qid: u64, sid: &str, page_size: u32) -> Vec<(String, String)> {
    let mut params = static_fields();
    params.push(("qid".into(), qid.to_string()));
    params.push(("SID".into(), sid.to_string()));
    params.push(("action".into(), "changePageSize".into()));
    params.push(("pageSize".into(), page_size.to_string()));
    params
}

/// Query string for one page of a result list
pub fn page_params(qid: u64, sid: &str, page: u32) -> Vec<(String, String)> {
    let mut params = static_fields();
    params.push(("qid".into(), qid.to_string()));
    params.push(("SID".into(), sid.to_string()));
    params.push(("page".into(), page.to_string()));
    params
}

/// `base?k=v&...` with form-style encoding
pub fn with_query(base: &str, params: &[(String, String)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k),
                urlencoding::encode(v).replace("%20", "+")
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", base, query)
}
