//! Final pass over the parser output: heading ids, permalinks and link
//! classes that cannot be expressed on the syntax tree.

use std::{cell::RefCell, rc::Rc};

use lol_html::{RewriteStrSettings, element, html_content::ContentType, rewrite_str};

use crate::{application::render::types::RenderError, util::html::escape_html};

use super::{config::ExtensionPlan, rewrite::HeadingSlot};

const STAGE: &str = "headings";
const MARKDOWN_HEADINGS: &str = "h1[data-sourcepos], h2[data-sourcepos], h3[data-sourcepos], \
                                 h4[data-sourcepos], h5[data-sourcepos], h6[data-sourcepos]";

pub(crate) fn finish_html(
    html: &str,
    headings: &[HeadingSlot],
    plan: &ExtensionPlan,
) -> Result<String, RenderError> {
    let headings_shared = Rc::new(headings.to_vec());
    let index = Rc::new(RefCell::new(0usize));
    let error_slot = Rc::new(RefCell::new(None));

    let permalink = plan.toc.as_ref().and_then(|toc| {
        toc.permalink.symbol().map(|symbol| {
            (
                symbol.to_string(),
                toc.permalink_class.clone(),
                toc.permalink_title.clone(),
            )
        })
    });
    let wikilink_class = plan
        .wikilinks
        .as_ref()
        .map(|config| config.html_class.clone());

    let mut handlers = vec![element!(MARKDOWN_HEADINGS, {
        let headings_shared = Rc::clone(&headings_shared);
        let index = Rc::clone(&index);
        let error_slot = Rc::clone(&error_slot);
        move |el| {
            let mut idx = index.borrow_mut();
            let Some(slot) = headings_shared.get(*idx) else {
                *error_slot.borrow_mut() = Some(RenderError::postprocess(
                    STAGE,
                    "more headings in output than in the document",
                ));
                return Ok(());
            };
            *idx += 1;

            if let Some(id) = &slot.id {
                el.set_attribute("id", &escape_html(id))?;
            }
            if !slot.attrs.classes.is_empty() {
                let merged = merge_classes(el.get_attribute("class"), &slot.attrs.classes);
                el.set_attribute("class", &escape_html(&merged))?;
            }
            for (key, value) in &slot.attrs.pairs {
                el.set_attribute(key, &escape_html(value))?;
            }

            if let (Some(id), Some((symbol, class, title))) = (&slot.id, permalink.as_ref()) {
                let anchor = format!(
                    "<a class=\"{}\" href=\"#{}\" title=\"{}\">{}</a>",
                    escape_html(class),
                    escape_html(id),
                    escape_html(title),
                    escape_html(symbol)
                );
                el.append(&anchor, ContentType::Html);
            }
            Ok(())
        }
    })];

    if let Some(class) = wikilink_class {
        handlers.push(element!("a[data-wikilink]", move |el| {
            let merged = merge_classes(el.get_attribute("class"), std::slice::from_ref(&class));
            el.set_attribute("class", &merged)?;
            el.remove_attribute("data-wikilink");
            Ok(())
        }));
    }

    handlers.push(element!("[data-sourcepos]", |el| {
        el.remove_attribute("data-sourcepos");
        Ok(())
    }));

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::postprocess(STAGE, err))?;

    if let Some(err) = error_slot.borrow_mut().take() {
        return Err(err);
    }

    Ok(rewritten)
}

fn merge_classes(existing: Option<String>, extra: &[String]) -> String {
    let mut classes: Vec<String> = existing
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    for class in extra {
        if !classes.contains(class) {
            classes.push(class.clone());
        }
    }
    classes.join(" ")
}
