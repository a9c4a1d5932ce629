use super::FetchError;
use crate::record::IdType;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

const XRPC_NAMESPACE: &str = "http://www.isinet.com/xrpc42";
const RETRIEVE_FUNCTION: &str = "LinksAMR.retrieve";

/// Fields requested for every paper. Citation count is asked for twice,
/// which is how the service's own examples phrase it.
const RETURNED_FIELDS: [&str; 5] = ["ut", "doi", "pmid", "timesCited", "timesCited"];

/// Build the XML request for one group of identifiers.
///
/// Each paper is named by its position in `values`, which is how the
/// response is matched back since the service does not keep order.
pub fn build_request(source: &str, id_type: IdType, values: &[&str]) -> Result<String, FetchError> {
    let mut writer = Writer::new(Vec::new());

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut request = BytesStart::new("request");
    request.push_attribute(("xmlns", XRPC_NAMESPACE));
    request.push_attribute(("src", source));
    write(&mut writer, Event::Start(request))?;

    let mut function = BytesStart::new("fn");
    function.push_attribute(("name", RETRIEVE_FUNCTION));
    write(&mut writer, Event::Start(function))?;
    start(&mut writer, "list")?;

    // Who is asking: authentication travels in `src`, so this map stays empty.
    write(&mut writer, Event::Empty(BytesStart::new("map")))?;

    // What to return
    start(&mut writer, "map")?;
    let mut wos = BytesStart::new("list");
    wos.push_attribute(("name", "WOS"));
    write(&mut writer, Event::Start(wos))?;
    for field in RETURNED_FIELDS {
        text_element(&mut writer, BytesStart::new("val"), field)?;
    }
    end(&mut writer, "list")?;
    end(&mut writer, "map")?;

    // Which papers
    start(&mut writer, "map")?;
    for (index, value) in values.iter().enumerate() {
        let name = index.to_string();
        let mut paper = BytesStart::new("map");
        paper.push_attribute(("name", name.as_str()));
        write(&mut writer, Event::Start(paper))?;

        let mut val = BytesStart::new("val");
        val.push_attribute(("name", id_type.wire_name()));
        text_element(&mut writer, val, value)?;

        end(&mut writer, "map")?;
    }
    end(&mut writer, "map")?;

    end(&mut writer, "list")?;
    end(&mut writer, "fn")?;
    end(&mut writer, "request")?;

    String::from_utf8(writer.into_inner()).map_err(|e| FetchError::Encode(e.to_string()))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), FetchError> {
    writer
        .write_event(event)
        .map_err(|e| FetchError::Encode(e.to_string()))
}

fn start(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), FetchError> {
    write(writer, Event::Start(BytesStart::new(name)))
}

fn end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), FetchError> {
    write(writer, Event::End(BytesEnd::new(name)))
}

fn text_element(
    writer: &mut Writer<Vec<u8>>,
    element: BytesStart<'_>,
    text: &str,
) -> Result<(), FetchError> {
    let name = String::from_utf8_lossy(element.name().as_ref()).to_string();
    write(writer, Event::Start(element))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    end(writer, &name)
}
