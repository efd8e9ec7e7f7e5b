use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str};

use crate::reports::ReportTable;

const CHAR_WIDTH: f32 = 5.2; // rough Helvetica advance at 9pt

/// Paginated single-table PDF writer.
pub struct PdfTableWriter {
    pdf: Pdf,
    catalog_id: Ref,
    pages_id: Ref,
    font_id: Ref,
    page_refs: Vec<Ref>,
    next_id: i32,

    page_w: f32,
    page_h: f32,
    margin: f32,
    row_h: f32,

    font_size: f32,
    header_font_size: f32,
    title_font_size: f32,
}

impl Default for PdfTableWriter {
    fn default() -> Self {
        Self::landscape()
    }
}

impl PdfTableWriter {
    /// A4 landscape
    pub fn landscape() -> Self {
        let mut pdf = Pdf::new();
        let catalog_id = Ref::new(1);
        let pages_id = Ref::new(2);
        let font_id = Ref::new(3);
        pdf.type1_font(font_id).base_font(Name(b"Helvetica"));

        Self {
            pdf,
            catalog_id,
            pages_id,
            font_id,
            page_refs: Vec::new(),
            next_id: 4,
            page_w: 842.0,
            page_h: 595.0,
            margin: 40.0,
            row_h: 18.0,
            font_size: 9.0,
            header_font_size: 10.0,
            title_font_size: 14.0,
        }
    }

    fn fresh_ref(&mut self) -> Ref {
        let id = self.next_id;
        self.next_id += 1;
        Ref::new(id)
    }

    fn rows_per_page(&self) -> usize {
        // title band + header row take the top of the page
        let usable = self.page_h - 2.0 * self.margin - 30.0 - self.row_h;
        ((usable / self.row_h).floor() as usize).max(1)
    }

    fn col_widths(&self, table: &ReportTable) -> Vec<f32> {
        let mut widths: Vec<f32> = table
            .headers
            .iter()
            .map(|h| h.len() as f32 * CHAR_WIDTH + 8.0)
            .collect();
        for row in &table.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = w.max(cell.chars().count() as f32 * CHAR_WIDTH + 8.0);
            }
        }

        let total: f32 = widths.iter().sum();
        let max = self.page_w - 2.0 * self.margin;
        if total > max {
            let scale = max / total;
            widths.iter_mut().for_each(|w| *w *= scale);
        }
        widths
    }

    fn text(&self, content: &mut Content, x: f32, y: f32, size: f32, text: &str) {
        let ascii = to_win_ansi(text);
        content.begin_text();
        content.set_font(Name(b"F1"), size);
        content.set_text_matrix([1.0, 0.0, 0.0, 1.0, x, y]);
        content.show(Str(&ascii));
        content.end_text();
    }

    fn row(&self, content: &mut Content, y: f32, widths: &[f32], cells: &[String], size: f32) {
        let mut x = self.margin;
        for (w, cell) in widths.iter().zip(cells) {
            let max_chars = ((w - 8.0) / CHAR_WIDTH).max(1.0) as usize;
            self.text(content, x + 4.0, y + 5.0, size, &truncate(cell, max_chars));

            content.save_state();
            content.set_stroke_rgb(0.65, 0.65, 0.65);
            content.rect(x, y, *w, self.row_h);
            content.stroke();
            content.restore_state();
            x += w;
        }
    }

    fn band(&self, content: &mut Content, y: f32, width: f32, gray: f32) {
        content.save_state();
        content.set_fill_rgb(gray, gray, gray + 0.03);
        content.rect(self.margin, y, width, self.row_h);
        content.fill_nonzero();
        content.restore_state();
    }

    pub fn write_table(&mut self, table: &ReportTable) {
        let widths = self.col_widths(table);
        let table_w: f32 = widths.iter().sum();
        let headers: Vec<String> = table.headers.iter().map(|h| h.to_string()).collect();

        let chunks: Vec<&[Vec<String>]> = if table.rows.is_empty() {
            vec![&table.rows[..]]
        } else {
            table.rows.chunks(self.rows_per_page()).collect()
        };
        let page_count = chunks.len();

        for (idx, chunk) in chunks.into_iter().enumerate() {
            let page_id = self.fresh_ref();
            let content_id = self.fresh_ref();
            self.page_refs.push(page_id);

            {
                let mut page = self.pdf.page(page_id);
                page.parent(self.pages_id)
                    .media_box(Rect::new(0.0, 0.0, self.page_w, self.page_h))
                    .contents(content_id);
                page.resources().fonts().pair(Name(b"F1"), self.font_id);
            }

            let mut content = Content::new();
            self.text(
                &mut content,
                self.margin,
                self.page_h - self.margin,
                self.title_font_size,
                &table.title,
            );
            if let Some(subtitle) = &table.subtitle {
                self.text(
                    &mut content,
                    self.margin,
                    self.page_h - self.margin - 16.0,
                    self.font_size,
                    subtitle,
                );
            }
            self.text(
                &mut content,
                self.page_w - self.margin - 70.0,
                self.margin - 25.0,
                self.font_size,
                &format!("Page {} of {}", idx + 1, page_count),
            );

            let mut y = self.page_h - self.margin - 30.0 - self.row_h;
            self.band(&mut content, y, table_w, 0.85);
            self.row(&mut content, y, &widths, &headers, self.header_font_size);

            for (i, cells) in chunk.iter().enumerate() {
                y -= self.row_h;
                if i % 2 == 0 {
                    self.band(&mut content, y, table_w, 0.96);
                }
                self.row(&mut content, y, &widths, cells, self.font_size);
            }

            self.pdf.stream(content_id, &content.finish());
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.pdf.catalog(self.catalog_id).pages(self.pages_id);
        {
            let mut pages = self.pdf.pages(self.pages_id);
            pages.count(self.page_refs.len() as i32);
            pages.kids(self.page_refs.iter().copied());
        }
        self.pdf.finish()
    }
}

pub fn render(table: &ReportTable) -> Vec<u8> {
    let mut writer = PdfTableWriter::landscape();
    writer.write_table(table);
    writer.finish()
}

/// The built-in Helvetica only covers Latin-1; anything else becomes '?'.
fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('~');
    out
}
