//! `multipart/form-data` request bodies.
//!
//! A form produces its own `content-type` header (boundary included); the
//! dispatcher sends exactly those headers and nothing else with it.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::with_boundary(format!("--------------------------{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into().into_bytes(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data: data.into(),
        });
        self
    }

    /// The complete header set this body requires.
    pub fn headers(&self) -> Vec<(String, String)> {
        vec![(
            "content-type".to_string(),
            format!("multipart/form-data; boundary={}", self.boundary),
        )]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", quote(&part.name));
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{}\"", quote(filename)));
            }
            out.extend_from_slice(disposition.as_bytes());
            out.extend_from_slice(b"\r\n");
            if let Some(content_type) = &part.content_type {
                out.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&part.data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

fn quote(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_text_and_file_parts() {
        let form = MultipartForm::with_boundary("XYZ")
            .text("title", "Report")
            .file("upload", "r.csv", "text/csv", b"a,b\n1,2".to_vec());
        let body = String::from_utf8(form.to_bytes()).unwrap();
        assert_eq!(
            body,
            "--XYZ\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             Report\r\n\
             --XYZ\r\n\
             Content-Disposition: form-data; name=\"upload\"; filename=\"r.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             a,b\n1,2\r\n\
             --XYZ--\r\n"
        );
    }

    #[test]
    fn headers_carry_the_boundary() {
        let form = MultipartForm::new();
        let headers = form.headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "content-type");
        assert!(headers[0].1.ends_with(form.boundary()));
    }

    #[test]
    fn field_names_are_quoted() {
        let form = MultipartForm::with_boundary("B").text("we\"ird", "v");
        let body = String::from_utf8(form.to_bytes()).unwrap();
        assert!(body.contains("name=\"we%22ird\""));
    }
}
