//! `update.xml` documents read by the client updater

use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, Event},
};

use crate::{
    error::{UpdateServiceError, UpdateServiceResult},
    types::{Resolution, UpdateDescriptor},
};

/// Render a resolution as an `<updates>` document. No update renders an
/// empty `<updates/>` element.
pub fn render_updates_xml(resolution: &Resolution) -> UpdateServiceResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_document(&mut writer, resolution)?;
    let mut xml = String::from_utf8(writer.into_inner())
        .map_err(|e| UpdateServiceError::Render(e.to_string()))?;
    xml.push('\n');
    Ok(xml)
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> UpdateServiceResult<()> {
    writer
        .write_event(event)
        .map_err(|e| UpdateServiceError::Render(e.to_string()))
}

fn write_document(writer: &mut Writer<Vec<u8>>, resolution: &Resolution) -> UpdateServiceResult<()> {
    emit(writer, Event::Decl(BytesDecl::new("1.0", None, None)))?;
    match resolution {
        Resolution::NoUpdate(_) => emit(writer, Event::Empty(BytesStart::new("updates"))),
        Resolution::Update(descriptor) => {
            emit(writer, Event::Start(BytesStart::new("updates")))?;
            write_update(writer, descriptor)?;
            emit(writer, Event::End(BytesEnd::new("updates")))
        }
    }
}

fn write_update(writer: &mut Writer<Vec<u8>>, update: &UpdateDescriptor) -> UpdateServiceResult<()> {
    let mut elem = BytesStart::new("update");
    elem.push_attribute(("type", update.update_type.as_str()));
    elem.push_attribute(("displayVersion", update.version.as_str()));
    elem.push_attribute(("appVersion", update.version.as_str()));
    // Read by older clients
    elem.push_attribute(("version", update.version.as_str()));
    elem.push_attribute(("extensionVersion", update.version.as_str()));
    elem.push_attribute(("buildID", update.build_id.as_str()));
    elem.push_attribute(("detailsURL", update.details_url.as_str()));
    if let Some(show_prompt) = update.show_prompt {
        elem.push_attribute(("showPrompt", if show_prompt { "true" } else { "false" }));
    }
    if let Some(wait) = update.prompt_wait_time {
        elem.push_attribute(("promptWaitTime", wait.to_string().as_str()));
    }

    emit(writer, Event::Start(elem))?;
    for patch in &update.patches {
        let size = patch.size.to_string();
        let mut elem = BytesStart::new("patch");
        elem.push_attribute(("type", patch.patch_type.as_str()));
        elem.push_attribute(("URL", patch.url.as_str()));
        elem.push_attribute(("hashFunction", patch.hash_function.as_str()));
        elem.push_attribute(("hashValue", patch.hash_value.as_str()));
        elem.push_attribute(("size", size.as_str()));
        emit(writer, Event::Empty(elem))?;
    }
    emit(writer, Event::End(BytesEnd::new("update")))
}
