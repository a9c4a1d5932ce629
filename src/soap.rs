//! Thin client for the SOAP "lite" search service.
//!
//! Only what is needed to get a session and run a search is implemented;
//! the returned search document is handed back as raw XML.

use crate::transport::{read_body, TransportError};
use async_trait::async_trait;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use thiserror::Error;

const SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const AUTH_NS: &str = "http://auth.cxf.wokmws.thomsonreuters.com";
const SEARCH_NS: &str = "http://woksearchlite.v3.cxf.wokmws.thomsonreuters.com";

#[derive(Error, Debug)]
pub enum SoapError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Service fault: {0}")]
    Fault(String),
    #[error("Failed to parse SOAP response: {0}")]
    Parse(String),
    #[error("Not authenticated")]
    NoSession,
}

/// One edition of a collection to search in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edition {
    pub collection: String,
    pub edition: String,
}

impl Edition {
    pub fn new(collection: &str, edition: &str) -> Self {
        Self {
            collection: collection.to_string(),
            edition: edition.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteQuery {
    pub database_id: String,
    pub user_query: String,
    pub editions: Vec<Edition>,
    pub language: String,
}

impl LiteQuery {
    /// Search the science and social science citation indexes
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            database_id: "WOS".to_string(),
            user_query: user_query.into(),
            editions: vec![Edition::new("WOS", "SCI"), Edition::new("WOS", "SSCI")],
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveParams {
    pub first_record: u32,
    /// 1 to 100
    pub count: u32,
    pub sort_field: String,
    pub sort_order: String,
}

impl Default for RetrieveParams {
    fn default() -> Self {
        Self {
            first_record: 1,
            count: 5,
            sort_field: "Relevance".to_string(),
            sort_order: "D".to_string(),
        }
    }
}

/// An authenticated search service
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Open a session and return its ID
    async fn authenticate(&mut self) -> Result<String, SoapError>;

    async fn search(&self, query: &LiteQuery, params: &RetrieveParams) -> Result<String, SoapError>;

    async fn close_session(&mut self) -> Result<(), SoapError>;
}

pub struct WokSoapClient {
    client: Client,
    auth_url: String,
    search_url: String,
    sid: Option<String>,
}

impl WokSoapClient {
    pub fn new(auth_url: impl Into<String>, search_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("wokharvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            auth_url: auth_url.into(),
            search_url: search_url.into(),
            sid: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    async fn call(&self, url: &str, envelope: String) -> Result<String, SoapError> {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=UTF-8")
            .header("SOAPAction", "");
        if let Some(sid) = &self.sid {
            request = request.header(reqwest::header::COOKIE, format!("SID=\"{}\"", sid));
        }

        let response = request.body(envelope).send().await.map_err(TransportError::from)?;
        // Faults come back with HTTP 500 and a body worth reading.
        if response.status() == reqwest::StatusCode::INTERNAL_SERVER_ERROR {
            let body = response.text().await.map_err(TransportError::from)?;
            return Err(fault_string(&body).map_or_else(
                || SoapError::Parse("HTTP 500 without a SOAP fault".to_string()),
                SoapError::Fault,
            ));
        }
        let body = read_body(response).await?;
        if let Some(fault) = fault_string(&body) {
            return Err(SoapError::Fault(fault));
        }
        Ok(body)
    }
}

#[async_trait]
impl SearchService for WokSoapClient {
    async fn authenticate(&mut self) -> Result<String, SoapError> {
        self.sid = None;
        let body = self
            .call(&self.auth_url, envelope(AUTH_NS, "<ns:authenticate/>"))
            .await?;
        let sid = element_text(&body, "return")?
            .ok_or_else(|| SoapError::Parse("No session ID in response".to_string()))?;
        self.sid = Some(sid.clone());
        Ok(sid)
    }

    async fn search(&self, query: &LiteQuery, params: &RetrieveParams) -> Result<String, SoapError> {
        if self.sid.is_none() {
            return Err(SoapError::NoSession);
        }
        self.call(&self.search_url, search_envelope(query, params))
            .await
    }

    async fn close_session(&mut self) -> Result<(), SoapError> {
        if self.sid.is_none() {
            return Ok(());
        }
        self.call(&self.auth_url, envelope(AUTH_NS, "<ns:closeSession/>"))
            .await?;
        self.sid = None;
        Ok(())
    }
}

fn envelope(namespace: &str, body: &str) -> String {
    format!(
        r#"<soapenv:Envelope xmlns:soapenv="{}" xmlns:ns="{}"><soapenv:Header/><soapenv:Body>{}</soapenv:Body></soapenv:Envelope>"#,
        SOAP_ENV, namespace, body
    )
}

fn search_envelope(query: &LiteQuery, params: &RetrieveParams) -> String {
    let editions: String = query
        .editions
        .iter()
        .map(|e| {
            format!(
                "<editions><collection>{}</collection><edition>{}</edition></editions>",
                escape(&e.collection),
                escape(&e.edition)
            )
        })
        .collect();

    let body = format!(
        "<ns:search>\
         <queryParameters><databaseId>{}</databaseId><userQuery>{}</userQuery>{}<queryLanguage>{}</queryLanguage></queryParameters>\
         <retrieveParameters><firstRecord>{}</firstRecord><count>{}</count>\
         <sortField><name>{}</name><sort>{}</sort></sortField></retrieveParameters>\
         </ns:search>",
        escape(&query.database_id),
        escape(&query.user_query),
        editions,
        escape(&query.language),
        params.first_record,
        params.count,
        escape(&params.sort_field),
        escape(&params.sort_order),
    );
    envelope(SEARCH_NS, &body)
}

fn fault_string(xml: &str) -> Option<String> {
    element_text(xml, "faultstring").ok().flatten()
}

/// Text of the first element with the given local name
fn element_text(xml: &str, name: &str) -> Result<Option<String>, SoapError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == name.as_bytes() => inside = true,
            Ok(Event::Text(t)) if inside => {
                let text = t.unescape().map_err(|e| SoapError::Parse(e.to_string()))?;
                return Ok(Some(text.to_string()));
            }
            Ok(Event::End(e)) if inside && e.local_name().as_ref() == name.as_bytes() => {
                return Ok(Some(String::new()))
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(SoapError::Parse(e.to_string())),
            _ => {}
        }
    }
}
