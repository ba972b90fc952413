#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::BTreeMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use subtitle_tutor_core::model::Credentials;

pub const SRT: &str = "1
00:00:01,000 --> 00:00:03,000
Rick: Hey, you made it!

2
00:00:03,500 --> 00:00:05,000
Beth: Traffic was a nightmare.

3
00:00:06,000 --> 00:00:08,000
Rick: Grab a seat, the menu's on the table.
";

pub const SEGMENTATION_REPLY: &str = r#"Here is the segmentation:
```json
{
  "subtitle_title": "Dinner",
  "segmentation_strategy": "按场景切换划分",
  "total_blocks": 5,
  "blocks": [
    {
      "block_index": 2,
      "block_name": "入座点餐",
      "synopsis": "Rick 招呼 Beth 坐下看菜单。",
      "start_line": 3,
      "end_line": 3,
      "learning_focus": { "vocabulary": ["grab a seat", "menu"] },
      "dialogues": [{ "order": 3, "speaker": "Rick", "text": "Grab a seat, the menu's on the table." }]
    },
    {
      "block_index": 1,
      "block_name": "见面寒暄",
      "synopsis": "两人见面，Beth 抱怨交通。",
      "start_line": 1,
      "end_line": 2,
      "dialogues": [
        { "order": 2, "speaker": "Beth", "text": "Traffic was a nightmare." },
        { "order": 1, "speaker": "Rick", "text": "Hey, you made it!" },
      ]
    }
  ]
}
```"#;

pub const ANALYSIS_REPLY: &str = r##"{
  "block_index": 1,
  "block_name": "见面寒暄",
  "modules": {
    "vocabulary": { "core": [{ "term": "nightmare", "meaning_cn": "噩梦；糟糕的经历" }] },
    "grammar": { "sentence_breakdown": ["You made it = 你赶到了"] },
    "listening_pronunciation": {},
    "culture_context": {},
    "practice": {}
  },
  "summary_markdown": "# 见面寒暄\n- nightmare"
}"##;

/// Normalized two-block scenario, as `tutor segment` would write it.
pub fn scenario_json() -> Value {
    json!({
        "subtitle_title": "Dinner",
        "segmentation_strategy": "按场景切换划分",
        "total_blocks": 2,
        "blocks": [
            {
                "block_index": 1,
                "block_name": "见面寒暄",
                "synopsis": "两人见面，Beth 抱怨交通。",
                "start_line": 1,
                "end_line": 2,
                "dialogues": [
                    { "order": 1, "speaker": "Rick", "text": "Hey, you made it!" },
                    { "order": 2, "speaker": "Beth", "text": "Traffic was a nightmare." }
                ]
            },
            {
                "block_index": 2,
                "block_name": "入座点餐",
                "synopsis": "Rick 招呼 Beth 坐下看菜单。",
                "start_line": 3,
                "end_line": 3,
                "learning_focus": { "vocabulary": "grab a seat；menu" },
                "dialogues": [
                    { "order": 3, "speaker": "Rick", "text": "Grab a seat, the menu's on the table." }
                ]
            }
        ]
    })
}

/// An OpenAI chat completions response body wrapping `content`.
pub fn chat_completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150 }
    }))
}

/// Mount a reply for every chat completion request.
pub async fn mount_reply(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(chat_completion(content))
        .mount(server)
        .await;
}

/// Credentials pointing at the mock server.
pub fn credentials(server: &MockServer) -> Credentials {
    Credentials {
        api_key: Some("sk-test".to_string()),
        base_url: Some(format!("{}/v1", server.uri())),
        extra_headers: BTreeMap::new(),
    }
}
