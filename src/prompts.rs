//! Extraction prompt and response schema.
//!
//! The prompt is written in Arabic because the documents are; the schema is
//! sent as the request's `responseSchema` so the service returns JSON that
//! parses into [`crate::output::ExtractionResult`].

use serde_json::{json, Value};

/// Build the extraction prompt for standard number `standard_number`.
pub fn extraction_prompt(standard_number: u32) -> String {
    format!(
        r#"أنت خبير في استخراج وتحليل النصوص من مستندات PDF باللغة العربية.

المهمة: استخرج محتوى هذا المعيار الشرعي (معيار رقم {standard_number}) من AAOIFI بدقة كاملة.

يجب أن تستخرج:

1. title: عنوان المعيار الكامل بالعربية
2. text: النص الكامل للمعيار مع الحفاظ على التنسيق الأصلي
3. sections: قائمة بجميع الأقسام والعناوين الفرعية بترتيب ورودها في المستند، كل قسم يحتوي على:
   - sec_id: رقم القسم (مثل 1، 1.1، 2، 2.1)
   - heading: عنوان القسم (فارغ إذا لم يكن للقسم عنوان)
   - text: نص القسم كاملاً
4. keywords: الكلمات المفتاحية الرئيسية المتعلقة بالمعيار (10-20 كلمة)
5. aliases: الأسماء البديلة للمعيار بالعربية والإنجليزية
6. pages: أرقام الصفحات الموجودة في المستند، صفحة لكل عنصر وبالترتيب

أرجع النتيجة بصيغة JSON صالحة فقط، بدون أي نص إضافي.

مثال على الصيغة المطلوبة:
{{
  "title": "عنوان المعيار",
  "text": "النص الكامل...",
  "sections": [
    {{"sec_id": "1", "heading": "المقدمة", "text": "نص المقدمة..."}},
    {{"sec_id": "1.1", "heading": "التعريفات", "text": "نص التعريفات..."}}
  ],
  "keywords": ["كلمة1", "كلمة2"],
  "aliases": ["الاسم البديل بالعربية", "English Alias"],
  "pages": ["1", "2", "3"]
}}

استخرج المحتوى بدقة مع الحفاظ على جميع الجداول والتنسيقات."#
    )
}

/// Fields every response must carry, in output order.
pub const REQUIRED_FIELDS: [&str; 6] = ["title", "text", "sections", "keywords", "aliases", "pages"];

/// Response schema in the OpenAPI subset accepted by `responseSchema`.
pub fn response_schema() -> Value {
    let string = json!({ "type": "STRING" });
    let string_list = json!({ "type": "ARRAY", "items": string });
    json!({
        "type": "OBJECT",
        "properties": {
            "title": string,
            "text": string,
            "sections": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "sec_id": string,
                        "heading": string,
                        "text": string
                    },
                    "required": ["sec_id", "heading", "text"],
                    "propertyOrdering": ["sec_id", "heading", "text"]
                }
            },
            "keywords": string_list,
            "aliases": string_list,
            "pages": string_list
        },
        "required": REQUIRED_FIELDS,
        "propertyOrdering": REQUIRED_FIELDS
    })
}
