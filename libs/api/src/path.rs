pub const LIVE_START: &str = "/posts/live/start/";

pub fn live_stop(live_id: &str) -> String {
    format!("/posts/live/{}/stop/", live_id)
}

pub fn live_upload_video(live_id: &str) -> String {
    format!("/posts/live/{}/upload-video/", live_id)
}

pub fn live_chat(post_id: &str) -> String {
    format!("/posts/live/{}/chat/", post_id)
}

pub fn live_chat_messages(post_id: &str) -> String {
    format!("/posts/live/{}/chat/messages/", post_id)
}
