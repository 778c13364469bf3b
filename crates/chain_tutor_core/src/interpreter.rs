//! crates/chain_tutor_core/src/interpreter.rs
//!
//! Prompt construction and reply interpretation for the two request shapes:
//! free-text (assistant) and structured (alert feed).

use crate::domain::{AlertRecord, Attachment, Citation};
use crate::error::IngestError;
use crate::fenced::extract_payload;
use crate::ports::{ContentPart, GenerateRequest, GenerateResponse, GroundingChunk};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

//=========================================================================================
// Fixed Texts
//=========================================================================================

/// Appended to every assistant reply.
pub const AUTHOR_ATTRIBUTION: &str = "\n\n© 2025 Bộ phận Đào tạo - Viện Công nghệ Blockchain và Trí tuệ nhân tạo (ABAII) (abaii.vn)";

/// Substituted when the provider returns no reply text.
pub const FALLBACK_REPLY: &str = "Xin lỗi, tôi không thể tạo phản hồi lúc này.";

pub const SOURCES_HEADING: &str = "**Nguồn tham khảo:**";

pub const ASSISTANT_SYSTEM_INSTRUCTION: &str = r#"Bạn là một trợ lý AI chuyên gia về công nghệ blockchain, ví tài sản mã hoá và sàn giao dịch tài sản mã hoá, được phát triển bởi Bộ phận Đào tạo - Viện Công nghệ Blockchain và Trí tuệ nhân tạo (ABAII). Nhiệm vụ của bạn là cung cấp các câu trả lời chính xác, rõ ràng và có cấu trúc tốt cho mục đích giáo dục.

HƯỚNG DẪN TRẢ LỜI:
- Sử dụng ngôn ngữ Tiếng Việt.
- **Định dạng câu trả lời bằng Markdown.** Sử dụng các tiêu đề (ví dụ: '## Tiêu đề chính', '### Tiêu đề phụ'), danh sách có dấu đầu dòng ('- '), danh sách có số thứ tự ('1. '), chữ **in đậm** ('**text**'), và chữ *in nghiêng* ('*text*') để làm cho câu trả lời dễ đọc và khoa học hơn.
- Nếu người dùng tải lên một tệp (hình ảnh, PDF, văn bản), hãy phân tích nội dung của nó và trả lời câu hỏi liên quan đến tệp đó trong bối cảnh blockchain.
- Nếu câu hỏi nằm ngoài phạm vi kiến thức về blockchain, ví hoặc sàn giao dịch tài sản mã hoá, hãy lịch sự thông báo rằng bạn không thể trả lời.
- **Không tự thêm bất kỳ thông tin nào về tác giả hay bản quyền vào cuối câu trả lời,** vì điều đó sẽ được thực hiện tự động."#;

pub const ALERTS_PROMPT: &str = r#"Cung cấp 5-7 cảnh báo lừa đảo mới nhất, nổi bật và đa dạng về hình thức trong không gian blockchain và tài sản mã hoá bằng tiếng Việt, tập trung vào những xu hướng được báo cáo gần đây (ví dụ: trong vòng 1 tháng trở lại đây).
Đối với mỗi cảnh báo:
1. Tuyệt đối ưu tiên thông tin từ các nguồn uy tín, đã được xác minh (ví dụ: cơ quan chức năng, tổ chức an ninh mạng, trang tin tức uy tín chuyên về blockchain/an ninh).
2. Cung cấp tiêu đề cảnh báo (tieuDeCanhBao).
3. Mô tả chi tiết về hình thức lừa đảo (moTaChiTiet).
4. Danh sách các dấu hiệu nhận biết cụ thể (dauHieuNhanBiet - là một mảng các chuỗi).
5. Danh sách các cách phòng tránh hiệu quả (cachPhongTranh - là một mảng các chuỗi).
6. Ngày cập nhật thông tin cảnh báo (ngayCapNhat, ví dụ: 'DD/MM/YYYY').
7. Nếu có URL đến nguồn tin gốc đáng tin cậy và có thể truy cập công khai cho cảnh báo cụ thể, hãy bao gồm nó trong trường urlNguonCanhBao.
Định dạng câu trả lời của bạn dưới dạng một mảng JSON của các đối tượng cảnh báo.
Ví dụ: [{"tieuDeCanhBao": "...", "moTaChiTiet": "...", "dauHieuNhanBiet": ["...", "..."], "cachPhongTranh": ["...", "..."], "ngayCapNhat": "28/07/2024", "urlNguonCanhBao": "..."}, ...]
QUAN TRỌNG: Phản hồi của bạn PHẢI CHỈ chứa mảng JSON này. KHÔNG thêm bất kỳ văn bản giới thiệu, giải thích, hoặc kết luận nào khác bên ngoài mảng JSON."#;

//=========================================================================================
// Citations
//=========================================================================================

/// Keeps chunks that carry both a uri and a title, in provider order.
pub fn extract_citations(grounding: Option<&[GroundingChunk]>) -> Option<Vec<Citation>> {
    grounding.map(|chunks| {
        chunks
            .iter()
            .filter_map(|chunk| match (&chunk.uri, &chunk.title) {
                (Some(uri), Some(title)) if !uri.is_empty() && !title.is_empty() => {
                    Some(Citation {
                        uri: uri.clone(),
                        title: title.clone(),
                    })
                }
                _ => None,
            })
            .collect()
    })
}

//=========================================================================================
// Free-Text Mode
//=========================================================================================

/// Builds the assistant request: attachment part first, then text.
/// Web search is enabled only when nothing is attached.
pub fn build_chat_request(
    model: &str,
    user_text: &str,
    attachment: Option<&Attachment>,
) -> GenerateRequest {
    let mut parts = Vec::with_capacity(2);
    if let Some(attachment) = attachment {
        parts.push(attachment.to_content_part());
    }
    let text = user_text.trim();
    if !text.is_empty() {
        parts.push(ContentPart::Text(text.to_string()));
    }

    GenerateRequest {
        model: model.to_string(),
        parts,
        system_instruction: Some(ASSISTANT_SYSTEM_INSTRUCTION.to_string()),
        web_search: attachment.is_none(),
    }
}

/// Turns a provider reply into the published message body.
///
/// Citations are only consulted when web search was requested.
pub fn compose_reply(response: &GenerateResponse, web_search: bool) -> String {
    let mut body = match response.text.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => FALLBACK_REPLY.to_string(),
    };

    let citations = if web_search {
        extract_citations(response.grounding.as_deref()).unwrap_or_default()
    } else {
        Vec::new()
    };
    if !citations.is_empty() {
        body.push_str("\n\n");
        body.push_str(SOURCES_HEADING);
        for citation in &citations {
            body.push_str(&format!("\n- [{}]({})", citation.title, citation.uri));
        }
    }

    body.push_str(AUTHOR_ATTRIBUTION);
    body
}

//=========================================================================================
// Structured Mode
//=========================================================================================

pub fn build_alerts_request(model: &str) -> GenerateRequest {
    GenerateRequest {
        model: model.to_string(),
        parts: vec![ContentPart::Text(ALERTS_PROMPT.to_string())],
        system_instruction: None,
        web_search: true,
    }
}

/// The wire shape the alerts prompt asks for. Missing fields default to empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAlert {
    #[serde(rename = "tieuDeCanhBao")]
    title: String,
    #[serde(rename = "moTaChiTiet")]
    description: String,
    #[serde(rename = "dauHieuNhanBiet")]
    indicators: Vec<String>,
    #[serde(rename = "cachPhongTranh")]
    mitigations: Vec<String>,
    #[serde(rename = "ngayCapNhat")]
    last_updated: String,
    #[serde(rename = "urlNguonCanhBao")]
    source_url: Option<String>,
}

/// Extracts, parses and shape-checks an alerts reply.
///
/// Every record gets a fresh id; all records share the fetch's citation list.
pub fn parse_alerts(response: &GenerateResponse) -> Result<Vec<AlertRecord>, IngestError> {
    let raw = response.text.as_deref().unwrap_or_default();
    let payload = extract_payload(raw);
    if payload.is_empty() {
        return Err(IngestError::EmptyPayload);
    }

    let value: Value =
        serde_json::from_str(payload).map_err(|e| IngestError::MalformedJson(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(IngestError::Shape(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };

    let citations = extract_citations(response.grounding.as_deref());

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(IngestError::Shape(format!(
                    "element {index} is {}, expected an object",
                    json_kind(&item)
                )));
            }
            let raw: RawAlert = serde_json::from_value(item)
                .map_err(|e| IngestError::Shape(format!("element {index}: {e}")))?;
            Ok(AlertRecord {
                id: Uuid::new_v4(),
                title: raw.title,
                description: raw.description,
                indicators: raw.indicators,
                mitigations: raw.mitigations,
                last_updated: raw.last_updated,
                source_url: raw.source_url.filter(|url| !url.trim().is_empty()),
                citations: citations.clone(),
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(uri: Option<&str>, title: Option<&str>) -> GroundingChunk {
        GroundingChunk {
            uri: uri.map(str::to_string),
            title: title.map(str::to_string),
        }
    }

    fn reply(text: &str, grounding: Option<Vec<GroundingChunk>>) -> GenerateResponse {
        GenerateResponse {
            text: Some(text.to_string()),
            grounding,
        }
    }

    #[test]
    fn chat_request_puts_attachment_before_text_and_disables_search() {
        let attachment = Attachment {
            source_file: "scam.png".into(),
            mime_type: "image/png".into(),
            size_bytes: 3,
            base64_payload: "AAAA".into(),
        };
        let request = build_chat_request("gemini-2.5-flash", "  Đây là lừa đảo gì? ", Some(&attachment));
        assert_eq!(
            request.parts,
            vec![
                ContentPart::InlineData {
                    mime_type: "image/png".into(),
                    data: "AAAA".into()
                },
                ContentPart::Text("Đây là lừa đảo gì?".into()),
            ]
        );
        assert!(!request.web_search);
        assert!(request.system_instruction.is_some());
    }

    #[test]
    fn chat_request_without_attachment_enables_search() {
        let request = build_chat_request("m", "Blockchain là gì?", None);
        assert_eq!(request.parts, vec![ContentPart::Text("Blockchain là gì?".into())]);
        assert!(request.web_search);
    }

    #[test]
    fn reply_without_citations_is_text_plus_attribution() {
        let body = compose_reply(&reply("Xin chào", None), true);
        assert_eq!(body, format!("Xin chào{AUTHOR_ATTRIBUTION}"));

        let body = compose_reply(&reply("Xin chào", Some(vec![])), true);
        assert_eq!(body, format!("Xin chào{AUTHOR_ATTRIBUTION}"));
    }

    #[test]
    fn sources_block_keeps_order_and_precedes_attribution() {
        let grounding = vec![
            chunk(Some("https://a.example"), Some("A")),
            chunk(Some("https://no-title.example"), None),
            chunk(Some("https://b.example"), Some("B")),
        ];
        let body = compose_reply(&reply("Trả lời", Some(grounding)), true);
        assert_eq!(
            body,
            format!(
                "Trả lời\n\n**Nguồn tham khảo:**\n- [A](https://a.example)\n- [B](https://b.example){AUTHOR_ATTRIBUTION}"
            )
        );
    }

    #[test]
    fn citations_ignored_when_search_was_not_requested() {
        let grounding = vec![chunk(Some("https://a.example"), Some("A"))];
        let body = compose_reply(&reply("Tệp", Some(grounding)), false);
        assert_eq!(body, format!("Tệp{AUTHOR_ATTRIBUTION}"));
    }

    #[test]
    fn missing_text_uses_fallback() {
        let body = compose_reply(&GenerateResponse::default(), true);
        assert_eq!(body, format!("{FALLBACK_REPLY}{AUTHOR_ATTRIBUTION}"));
    }

    #[test]
    fn parses_fenced_alerts_and_shares_citations() {
        let text = r#"```json
[
  {"tieuDeCanhBao": "Airdrop giả", "moTaChiTiet": "Mạo danh dự án", "dauHieuNhanBiet": ["Yêu cầu seed phrase"], "cachPhongTranh": ["Không chia sẻ seed"], "ngayCapNhat": "01/07/2025", "urlNguonCanhBao": "https://src.example"},
  {"tieuDeCanhBao": "Pig butchering", "moTaChiTiet": "Lừa tình", "dauHieuNhanBiet": [], "cachPhongTranh": [], "ngayCapNhat": "02/07/2025"}
]
```"#;
        let grounding = vec![chunk(Some("https://news.example"), Some("News"))];
        let alerts = parse_alerts(&reply(text, Some(grounding))).unwrap();

        assert_eq!(alerts.len(), 2);
        assert_ne!(alerts[0].id, alerts[1].id);
        assert_eq!(alerts[0].title, "Airdrop giả");
        assert_eq!(alerts[0].indicators, vec!["Yêu cầu seed phrase".to_string()]);
        assert_eq!(alerts[0].source_url.as_deref(), Some("https://src.example"));
        assert_eq!(alerts[1].source_url, None);
        assert_eq!(alerts[0].citations, alerts[1].citations);
        assert_eq!(
            alerts[0].citations,
            Some(vec![Citation {
                uri: "https://news.example".into(),
                title: "News".into()
            }])
        );
    }

    #[test]
    fn empty_reply_is_empty_payload() {
        assert_eq!(
            parse_alerts(&reply("```json\n```", None)),
            Err(IngestError::EmptyPayload)
        );
        assert_eq!(
            parse_alerts(&GenerateResponse::default()),
            Err(IngestError::EmptyPayload)
        );
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = parse_alerts(&reply("[{\"tieuDeCanhBao\": ", None)).unwrap_err();
        assert!(matches!(err, IngestError::MalformedJson(_)));
    }

    #[test]
    fn object_payload_is_shape_error() {
        let err = parse_alerts(&reply(r#"{"alerts": []}"#, None)).unwrap_err();
        assert!(matches!(err, IngestError::Shape(_)));
    }

    #[test]
    fn non_object_element_is_shape_error() {
        let err = parse_alerts(&reply(r#"[{"tieuDeCanhBao": "x"}, 42]"#, None)).unwrap_err();
        assert!(matches!(err, IngestError::Shape(_)));
    }

    #[test]
    fn grounding_not_reported_stays_distinct_from_zero_results() {
        let none = parse_alerts(&reply("[{}]", None)).unwrap();
        assert_eq!(none[0].citations, None);

        let empty = parse_alerts(&reply("[{}]", Some(vec![]))).unwrap();
        assert_eq!(empty[0].citations, Some(vec![]));
    }
}
