// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Textual mini-languages embedded in content files.
//!
//! Blend equations read like the math they describe: `s*(sa)+d*(1-sa)` is
//! classic alpha blending, `min(s,d)` keeps the darker value. A `|` separates
//! an optional alpha equation. Compare and stencil operations use short
//! tokens where `r` is the reference value and `b` the buffer value.

use super::enums::{BlendFactor, BlendOp, CompareOp, StencilOp};
use super::flags::ColorWriteMask;
use crate::cgi::error::{ConfigurationError, Result};

/// Blending disabled.
pub const VERUS_BLEND_OFF: &str = "off";
/// Straight alpha blending.
pub const VERUS_BLEND_ALPHA: &str = "s*(sa)+d*(1-sa)";
/// Additive blending.
pub const VERUS_BLEND_ADD: &str = "s*(1)+d*(1)";
/// Multiplicative blending.
pub const VERUS_BLEND_MUL: &str = "s*(dc)+d*(0)";
/// Premultiplied alpha blending.
pub const VERUS_BLEND_PA: &str = "s*(1)+d*(1-sa)";

/// Blend factor tokens, in table order.
pub const BLEND_FACTOR_TOKENS: [(&str, BlendFactor); 13] = [
    ("0", BlendFactor::Zero),
    ("1", BlendFactor::One),
    ("1-da", BlendFactor::InvDstAlpha),
    ("1-dc", BlendFactor::InvDstColor),
    ("1-f", BlendFactor::InvBlendFactor),
    ("1-sa", BlendFactor::InvSrcAlpha),
    ("1-sc", BlendFactor::InvSrcColor),
    ("da", BlendFactor::DstAlpha),
    ("dc", BlendFactor::DstColor),
    ("f", BlendFactor::BlendFactor),
    ("sa", BlendFactor::SrcAlpha),
    ("sat", BlendFactor::SrcAlphaSat),
    ("sc", BlendFactor::SrcColor),
];

/// Compare op tokens, in table order.
pub const COMPARE_OP_TOKENS: [(&str, CompareOp); 8] = [
    ("0", CompareOp::Never),
    ("1", CompareOp::Always),
    ("r!=b", CompareOp::NotEqual),
    ("r<=b", CompareOp::LessOrEqual),
    ("r<b", CompareOp::Less),
    ("r==b", CompareOp::Equal),
    ("r>=b", CompareOp::GreaterOrEqual),
    ("r>b", CompareOp::Greater),
];

/// Stencil op tokens, in table order.
pub const STENCIL_OP_TOKENS: [(&str, StencilOp); 8] = [
    ("0", StencilOp::Zero),
    ("b", StencilOp::Keep),
    ("b++", StencilOp::IncrementClamp),
    ("b--", StencilOp::DecrementClamp),
    ("bw+", StencilOp::IncrementWrap),
    ("bw-", StencilOp::DecrementWrap),
    ("b~", StencilOp::Invert),
    ("r", StencilOp::Replace),
];

/// Factors and operation for one channel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    /// Source factor.
    pub src_factor: BlendFactor,
    /// Destination factor.
    pub dst_factor: BlendFactor,
    /// Combining operation.
    pub op: BlendOp,
}

impl BlendComponent {
    /// `src * 1 + dst * 0`.
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        op: BlendOp::Add,
    };

    fn to_alpha(self) -> Self {
        Self {
            src_factor: self.src_factor.to_alpha(),
            dst_factor: self.dst_factor.to_alpha(),
            op: self.op,
        }
    }
}

/// The parsed form of one attachment's blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentBlend {
    /// `false` for `"off"`.
    pub enabled: bool,
    /// RGB equation.
    pub color: BlendComponent,
    /// Alpha equation.
    pub alpha: BlendComponent,
}

impl AttachmentBlend {
    /// Blending disabled.
    pub const OFF: Self = Self {
        enabled: false,
        color: BlendComponent::REPLACE,
        alpha: BlendComponent::REPLACE,
    };
}

fn parse_error(what: &'static str, input: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::Parse {
        what,
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// Parses a blend factor token such as `1-sa`.
pub fn parse_blend_factor(token: &str) -> Result<BlendFactor> {
    BLEND_FACTOR_TOKENS
        .iter()
        .find(|(t, _)| *t == token)
        .map(|(_, f)| *f)
        .ok_or_else(|| parse_error("blend factor", token, "unknown token").into())
}

/// Returns the token of a blend factor.
pub fn blend_factor_token(factor: BlendFactor) -> &'static str {
    BLEND_FACTOR_TOKENS
        .iter()
        .find(|(_, f)| *f == factor)
        .map(|(t, _)| *t)
        .unwrap_or("0")
}

/// Splits `X*(F)` into `('X', "F")` and returns the rest of the input.
fn take_term(input: &str) -> Option<(char, &str, &str)> {
    let mut chars = input.chars();
    let operand = chars.next()?;
    let rest = chars.as_str().strip_prefix("*(")?;
    let close = rest.find(')')?;
    Some((operand, &rest[..close], &rest[close + 1..]))
}

fn parse_component(equation: &str, original: &str) -> Result<BlendComponent> {
    const WHAT: &str = "blend equation";
    match equation {
        "min(s,d)" | "min(d,s)" => {
            return Ok(BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::One,
                op: BlendOp::Min,
            })
        }
        "max(s,d)" | "max(d,s)" => {
            return Ok(BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::One,
                op: BlendOp::Max,
            })
        }
        _ => {}
    }

    let (first, first_factor, rest) =
        take_term(equation).ok_or_else(|| parse_error(WHAT, original, "expected 's*(F)' or 'd*(F)'"))?;
    let mut rest_chars = rest.chars();
    let sign = rest_chars
        .next()
        .ok_or_else(|| parse_error(WHAT, original, "expected '+' or '-'"))?;
    let (second, second_factor, tail) = take_term(rest_chars.as_str())
        .ok_or_else(|| parse_error(WHAT, original, "expected a second term"))?;
    if !tail.is_empty() {
        return Err(parse_error(WHAT, original, format!("unexpected '{tail}'")).into());
    }

    let first_factor = parse_blend_factor(first_factor)?;
    let second_factor = parse_blend_factor(second_factor)?;

    let (src_factor, dst_factor, op) = match (first, sign, second) {
        ('s', '+', 'd') => (first_factor, second_factor, BlendOp::Add),
        ('d', '+', 's') => (second_factor, first_factor, BlendOp::Add),
        ('s', '-', 'd') => (first_factor, second_factor, BlendOp::Subtract),
        ('d', '-', 's') => (second_factor, first_factor, BlendOp::ReverseSubtract),
        _ => {
            return Err(
                parse_error(WHAT, original, "terms must combine 's' and 'd' with '+' or '-'").into(),
            )
        }
    };

    Ok(BlendComponent {
        src_factor,
        dst_factor,
        op,
    })
}

/// Parses a blend equation such as `s*(sa)+d*(1-sa)` or `off`.
pub fn parse_blend_equation(input: &str) -> Result<AttachmentBlend> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact == VERUS_BLEND_OFF {
        return Ok(AttachmentBlend::OFF);
    }
    if compact.is_empty() {
        return Err(parse_error("blend equation", input, "empty equation").into());
    }

    let (color, alpha) = match compact.split_once('|') {
        Some((color, alpha)) => {
            let color = parse_component(color, input)?;
            (color, parse_component(alpha, input)?)
        }
        None => {
            let color = parse_component(&compact, input)?;
            (color, color.to_alpha())
        }
    };

    Ok(AttachmentBlend {
        enabled: true,
        color,
        alpha,
    })
}

/// Parses a color write mask such as `rgb`. The empty string disables writes.
pub fn parse_color_write_mask(input: &str) -> Result<ColorWriteMask> {
    let mut mask = ColorWriteMask::empty();
    for c in input.chars() {
        mask |= match c {
            'r' => ColorWriteMask::R,
            'g' => ColorWriteMask::G,
            'b' => ColorWriteMask::B,
            'a' => ColorWriteMask::A,
            other => {
                return Err(
                    parse_error("color write mask", input, format!("unknown channel '{other}'"))
                        .into(),
                )
            }
        };
    }
    Ok(mask)
}

/// Parses a compare op token such as `r<=b`.
pub fn parse_compare_op(token: &str) -> Result<CompareOp> {
    let token = token.trim();
    COMPARE_OP_TOKENS
        .iter()
        .find(|(t, _)| *t == token)
        .map(|(_, op)| *op)
        .ok_or_else(|| parse_error("compare op", token, "unknown token").into())
}

/// Returns the token of a compare op.
pub fn compare_op_token(op: CompareOp) -> &'static str {
    COMPARE_OP_TOKENS
        .iter()
        .find(|(_, o)| *o == op)
        .map(|(t, _)| *t)
        .unwrap_or("1")
}

/// Parses a stencil op token such as `b++`.
pub fn parse_stencil_op(token: &str) -> Result<StencilOp> {
    let token = token.trim();
    STENCIL_OP_TOKENS
        .iter()
        .find(|(t, _)| *t == token)
        .map(|(_, op)| *op)
        .ok_or_else(|| parse_error("stencil op", token, "unknown token").into())
}

/// Returns the token of a stencil op.
pub fn stencil_op_token(op: StencilOp) -> &'static str {
    STENCIL_OP_TOKENS
        .iter()
        .find(|(_, o)| *o == op)
        .map(|(t, _)| *t)
        .unwrap_or("b")
}
