//! Centered overlay for the static legal pages and help.

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Style},
    widgets::{
        Block, Borders, Clear, Paragraph, Widget, Wrap,
        block::{Position, Title},
    },
};

use crate::ui::commands::get_help_text;

/// Which overlay is open, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Terms,
    Privacy,
    Contact,
    Help,
}

const TERMS_BODY: &str = "\
제1조 (목적)
본 약관은 Ai 무료 법률 비서(이하 \"서비스\")가 제공하는 인공지능 기반 법률 정보 제공 서비스의 이용 조건 및 절차, 이용자와 서비스의 권리, 의무 및 책임사항을 규정함을 목적으로 합니다.

제2조 (서비스의 성격 및 책임의 한계)
1. 본 서비스는 인공지능(AI) 기술을 활용하여 일반적인 법률 정보와 문서 초안을 제공하는 도구일 뿐이며, 변호사법에 따른 법률 상담이나 법적 대리 행위를 제공하지 않습니다.
2. 제공되는 모든 정보는 참고용이며, 구체적인 사안에 대한 최종적인 법적 판단이나 해결책이 될 수 없습니다.
3. 본 서비스의 정보를 활용하여 발생한 법적 분쟁이나 손해에 대해 서비스 제공자는 어떠한 법적 책임도 지지 않습니다. 중요한 법률 문제는 반드시 변호사 등 법률 전문가와 상담하시기 바랍니다.

제3조 (저작권 및 이용권)
1. 서비스가 생성한 법률 문서 초안의 저작권은 사용자에게 귀속되나, 서비스 개선을 위한 데이터로 활용될 수 있습니다.";

const PRIVACY_BODY: &str = "\
1. 개인정보 수집 항목
본 서비스는 원활한 서비스 제공을 위해 다음과 같은 정보를 수집할 수 있습니다.
- 상담 내용 (법률 질의 및 응답 데이터)
- 이용자가 업로드한 문서 및 이미지 파일
- 접속 로그 등 기술적 정보

2. 개인정보의 이용 목적
- AI 모델의 학습 및 답변 정확도 개선 (비식별화 처리 후)
- 서비스 이용에 따른 본인 확인 및 맞춤형 서비스 제공
- 서비스 관련 문의 응대

3. 개인정보의 제3자 제공
서비스는 이용자의 동의 없이 개인정보를 외부에 제공하지 않습니다. 다만, 법령에 의거하거나 수사 목적으로 법령에 정해진 절차와 방법에 따라 수사기관의 요구가 있는 경우는 예외로 합니다.";

const CONTACT_BODY: &str = "\
문의하기 / 제휴 제안

서비스 이용 중 불편한 점이나 제안 사항이 있으시면 아래 이메일로 연락 주시기 바랍니다.
법률 관련 직접적인 자문 요청에는 답변드리지 않습니다.

대표 이메일: yourkang7979@gmail.com";

impl Modal {
    pub fn title(&self) -> &'static str {
        match self {
            Modal::Terms => "이용약관",
            Modal::Privacy => "개인정보처리방침",
            Modal::Contact => "문의하기",
            Modal::Help => "도움말",
        }
    }

    fn body(&self) -> String {
        match self {
            Modal::Terms => TERMS_BODY.to_string(),
            Modal::Privacy => PRIVACY_BODY.to_string(),
            Modal::Contact => CONTACT_BODY.to_string(),
            Modal::Help => get_help_text(),
        }
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer) {
        let modal_area = centered_rect(area, 70, 80);
        Clear.render(modal_area, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", self.title()))
            .title(
                Title::from(" Esc 닫기 ")
                    .position(Position::Bottom)
                    .alignment(Alignment::Right),
            )
            .style(Style::default().fg(Color::White).bg(Color::Black));
        Paragraph::new(self.body())
            .wrap(Wrap { trim: false })
            .block(block)
            .render(modal_area, buf);
    }
}

fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let width = (u32::from(area.width) * u32::from(percent_x) / 100) as u16;
    let height = (u32::from(area.height) * u32::from(percent_y) / 100) as u16;
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}
