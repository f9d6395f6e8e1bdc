//! Parser for a project's `archive_spec` XML.
//!
//! Pipelines configured for auto-launch are registered under a generated
//! step id. The launch endpoint only accepts that id, so the human pipeline
//! name has to be mapped through:
//!
//! ```xml
//! <arc:project xmlns:arc="http://nrg.wustl.edu/arc">
//!   <arc:pipelines>
//!     <arc:descendants>
//!       <arc:descendant>
//!         <arc:pipeline stepId="step3">
//!           <arc:name>FreeSurfer</arc:name>
//! ```

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use xnatkit_shared::{Result, XnatKitError};

/// Element path (local names) leading to a pipeline declaration.
const PIPELINE_PATH: [&[u8]; 4] = [b"pipelines", b"descendants", b"descendant", b"pipeline"];

/// Parse `archive_spec` XML into a map of pipeline name -> step id.
pub fn parse_pipeline_aliases(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut aliases = HashMap::new();
    let mut step_id: Option<String> = None;
    let mut name: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(e.local_name().as_ref().to_vec());
                if at_pipeline(&stack) {
                    step_id = step_id_of(&e)?;
                    name = None;
                }
            }
            Ok(Event::Empty(e)) => {
                stack.push(e.local_name().as_ref().to_vec());
                if at_pipeline(&stack) {
                    tracing::debug!("pipeline declaration without a name, skipping");
                }
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                let in_name = stack.last().is_some_and(|n| n == b"name")
                    && at_pipeline(&stack[..stack.len() - 1]);
                if in_name {
                    name = Some(String::from_utf8_lossy(t.as_ref()).trim().to_string());
                }
            }
            Ok(Event::End(_)) => {
                if at_pipeline(&stack) {
                    match (name.take(), step_id.take()) {
                        (Some(n), Some(id)) => {
                            aliases.insert(n, id);
                        }
                        (n, id) => {
                            tracing::debug!(?n, ?id, "incomplete pipeline declaration, skipping");
                        }
                    }
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XnatKitError::parse(format!(
                    "invalid archive_spec XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(aliases)
}

/// True when the element stack ends in `root/pipelines/descendants/descendant/pipeline`.
fn at_pipeline(stack: &[Vec<u8>]) -> bool {
    stack.len() == PIPELINE_PATH.len() + 1
        && stack[1..]
            .iter()
            .zip(PIPELINE_PATH)
            .all(|(seen, want)| seen.as_slice() == want)
}

fn step_id_of(e: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| XnatKitError::parse(format!("archive_spec attribute: {e}")))?;
        if attr.key.local_name().as_ref() == b"stepId" {
            return Ok(Some(String::from_utf8_lossy(attr.value.as_ref()).into_owned()));
        }
    }
    Ok(None)
}
