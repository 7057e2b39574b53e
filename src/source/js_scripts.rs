// src/source/js_scripts.rs

pub const VIDEO_TITLE: &str = r##"
() => {
    const watchMeta = document.querySelector("ytd-watch-metadata");
    if (!watchMeta) return "";
    const titleEl = watchMeta.querySelector("#title h1 yt-formatted-string");
    return titleEl ? titleEl.textContent.trim() : "";
}
"##;

pub const CHANNEL_NAME: &str = r##"
() => {
    const watchMeta = document.querySelector("ytd-watch-metadata");
    if (!watchMeta) return "";
    const ownerEl = watchMeta.querySelector("#owner ytd-video-owner-renderer");
    if (!ownerEl) return "";
    const channelLink = ownerEl.querySelector("#channel-name #container #text-container yt-formatted-string a");
    return channelLink ? channelLink.textContent.trim() : "";
}
"##;

/// Attaches the chat observer to the current `#items` container. Returns
/// whether an observer is active.
///
/// A container YouTube has replaced or detached gets its observer
/// disconnected and a new one attached to the live node. Every captured item
/// is pushed onto `window._ytChatLog` as `{id, kind, name, message, time,
/// status}`; `DRAIN_QUEUE` empties it.
pub const OBSERVER_SETUP: &str = r##"
() => {
    const container = document.querySelector(
        "#items.yt-live-chat-item-list-renderer, yt-live-chat-item-list-renderer #items"
    );
    if (!container) return false;
    if (window._ytChatMonitorInstalled
        && window._chatContainer === container
        && window._chatContainer.isConnected) {
        return true;
    }
    window._ytChatLog = window._ytChatLog || [];

    function messageText(el) {
        const container = el.querySelector("#message");
        if (!container) return "";
        let text = "";
        container.childNodes.forEach(node => {
            if (node.nodeType === Node.TEXT_NODE) {
                text += node.textContent;
            } else if (node.nodeType === Node.ELEMENT_NODE && node.tagName.toLowerCase() === "img") {
                text += node.getAttribute("shared-tooltip-text") || node.getAttribute("alt") || "";
            } else if (node.nodeType === Node.ELEMENT_NODE) {
                text += node.textContent;
            }
        });
        return text.trim();
    }

    function push(el, kind, status) {
        try {
            const id = el.getAttribute("id") || el.getAttribute("data-id") || "";
            const nameEl = el.querySelector("#author-name, .yt-live-chat-author-chip #author-name");
            const name = nameEl ? nameEl.textContent.trim() : "";
            const message = messageText(el);
            if (!name && !message && kind === "message") return;
            window._ytChatLog.push({
                id: id,
                kind: kind,
                name: name,
                message: message,
                time: new Date().toISOString(),
                status: status || ""
            });
        } catch (e) {}
    }

    function deletedState(el) {
        const state = el.querySelector("#deleted-state");
        return state ? state.textContent.trim() : "";
    }

    function capture(node) {
        if (node.nodeType !== Node.ELEMENT_NODE) return;
        if (node.matches("yt-live-chat-text-message-renderer, yt-live-chat-paid-message-renderer")) {
            if (node.hasAttribute("is-deleted")) {
                push(node, "deletion", deletedState(node));
            } else {
                push(node, "message", "");
            }
        } else if (node.matches("yt-live-chat-moderation-message-renderer")) {
            push(node, "moderation", "");
        }
    }

    container.querySelectorAll(
        "yt-live-chat-text-message-renderer, yt-live-chat-paid-message-renderer"
    ).forEach(capture);

    if (window._chatObserver) {
        window._chatObserver.disconnect();
    }

    const observer = new MutationObserver(mutations => {
        mutations.forEach(mutation => {
            if (mutation.type === "attributes") {
                if (mutation.target.hasAttribute("is-deleted")) {
                    push(mutation.target, "deletion", deletedState(mutation.target));
                }
                return;
            }
            mutation.addedNodes.forEach(capture);
        });
    });

    observer.observe(container, {
        childList: true,
        subtree: true,
        attributes: true,
        attributeFilter: ["is-deleted"]
    });
    window._chatObserver = observer;
    window._chatContainer = container;
    window._ytChatMonitorInstalled = true;
    return true;
}
"##;

pub const DRAIN_QUEUE: &str = r#"
() => {
    const log = window._ytChatLog || [];
    window._ytChatLog = [];
    return log;
}
"#;

/// True while the observer watches the container currently in the document.
pub const OBSERVER_ALIVE: &str = r##"
() => {
    const current = document.querySelector(
        "#items.yt-live-chat-item-list-renderer, yt-live-chat-item-list-renderer #items"
    );
    return !!(window._ytChatMonitorInstalled
        && current
        && window._chatContainer === current
        && window._chatContainer.isConnected);
}
"##;
