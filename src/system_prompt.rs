//! System prompt construction for script role-play
//!
//! One builder keyed by [`ConversationMode`]: the modes differ only in who the
//! model impersonates and what counts as success, so the script block, the
//! objections block and the persona block are composed the same way for all
//! three.

use crate::api::{ConversationMode, ObjectionSummary};
use std::fmt::Write;

/// Shown to the model when no script was supplied
const SCRIPT_PLACEHOLDER: &str = "Скрипт не загружен";

const MANAGER_NAME: &str = "Алексей";
const CLIENT_NAME: &str = "Дмитрий Сергеевич";
const CLIENT_TITLE: &str = "Коммерческий директор";
const CLIENT_COMPANY: &str = "ООО \"ТехноСтар\"";

const CLIENT_ROLE: &str = r"Ты играешь роль КЛИЕНТА, которому звонит менеджер по продажам. Твоя задача — реалистично имитировать поведение живого клиента во время холодного звонка.

ПРАВИЛА ПОВЕДЕНИЯ:
1. Веди себя как настоящий клиент — иногда заинтересованный, иногда скептичный, иногда занятой
2. Реагируй естественно на то, что говорит менеджер
3. Задавай уточняющие вопросы
4. Иногда выдвигай возражения (цена, время, доверие, не нужно и т.д.)
5. Если менеджер хорошо обрабатывает возражения — можешь смягчиться и проявить интерес
6. Отвечай коротко, как в реальном телефонном разговоре (1-3 предложения)
7. Не будь слишком лёгким клиентом — создавай реалистичное сопротивление
8. Иногда перебивай или просишь говорить конкретнее";

const MANAGER_ROLE: &str = r"Ты играешь роль МЕНЕДЖЕРА ПО ПРОДАЖАМ, который звонит клиенту. Твоя задача — провести разговор по скрипту и довести клиента до следующего шага.

ПРАВИЛА ПОВЕДЕНИЯ:
1. Следуй скрипту продаж, но адаптируй формулировки под ответы клиента
2. Внимательно слушай клиента и реагируй на то, что он сказал
3. Активно отрабатывай возражения, опираясь на базу возражений
4. Задавай вопросы, чтобы выявить потребности клиента
5. Отвечай коротко, как в реальном телефонном разговоре (1-3 предложения)
6. Стремись договориться о встрече или повторном звонке
7. Оставайся вежливым и уверенным, не дави на клиента";

const AUTO_ROLE: &str = r"Ты симулируешь ПОЛНЫЙ ТЕЛЕФОННЫЙ РАЗГОВОР между менеджером по продажам и клиентом. Ты играешь ОБЕ роли одновременно.

ФОРМАТ ОТВЕТА:
Каждую реплику начинай с метки роли:
**Менеджер:** [реплика менеджера]
**Клиент:** [реплика клиента]

ПРАВИЛА:
1. Менеджер следует скрипту продаж и обрабатывает возражения
2. Клиент ведёт себя реалистично — задаёт вопросы, возражает, иногда соглашается
3. Разговор должен быть реалистичным и поучительным, без повторов уже сказанного
4. Каждая реплика — 1-3 предложения
5. Если просят провести весь разговор — напиши его полностью (8-15 реплик суммарно) и заверши логически: либо назначена встреча, либо клиент отказался
6. Если просят продолжить — напиши следующие 2-4 реплики и продвинь разговор дальше, не завершая его раньше времени";

/// Trigger text for `start()`, one per mode
#[must_use]
pub fn opening_instruction(mode: ConversationMode) -> &'static str {
    match mode {
        ConversationMode::Client => "Начни разговор — ты клиент, тебе только что позвонили.",
        ConversationMode::Manager => {
            "Начни разговор — ты менеджер, ты только что позвонил клиенту."
        }
        ConversationMode::Auto => {
            "Начни полный разговор между менеджером и клиентом. Проведи весь диалог от начала до конца."
        }
    }
}

/// Trigger text for `continue_auto()`
pub const CONTINUE_INSTRUCTION: &str =
    "Продолжи диалог — напиши следующие реплики менеджера и клиента.";

/// Build the role-instruction preamble for one request
#[must_use]
pub fn build_system_prompt(
    mode: ConversationMode,
    script_content: &str,
    objections: &[ObjectionSummary],
) -> String {
    let mut prompt = String::from(match mode {
        ConversationMode::Client => CLIENT_ROLE,
        ConversationMode::Manager => MANAGER_ROLE,
        ConversationMode::Auto => AUTO_ROLE,
    });

    let script_heading = match mode {
        ConversationMode::Client => {
            "СКРИПТ ПРОДАЖ (для контекста — это скрипт менеджера, ты должен реагировать на него как клиент):"
        }
        ConversationMode::Manager => "СКРИПТ ПРОДАЖ (следуй ему в разговоре):",
        ConversationMode::Auto => "СКРИПТ ПРОДАЖ:",
    };
    let script = if script_content.trim().is_empty() {
        SCRIPT_PLACEHOLDER
    } else {
        script_content
    };
    let _ = write!(prompt, "\n\n{script_heading}\n{script}");

    if !objections.is_empty() {
        let objections_heading = match mode {
            ConversationMode::Client => {
                "У тебя есть база возражений. Когда менеджер говорит что-то, а ты (клиент) возражаешь — используй эти типичные возражения:"
            }
            ConversationMode::Manager => {
                "База типичных возражений клиентов. Будь готов их отработать:"
            }
            ConversationMode::Auto => {
                "База возражений — клиент может их использовать, а менеджер должен их отработать:"
            }
        };
        let _ = write!(prompt, "\n\n{objections_heading}\n");
        for objection in objections {
            let _ = write!(
                prompt,
                "\n- Категория: {}, Триггер: \"{}\", Ключевые слова: [{}]",
                objection.category,
                objection.trigger,
                objection.keywords.join(", ")
            );
        }
    }

    let persona = match mode {
        ConversationMode::Client => format!(
            "Имя клиента: {CLIENT_NAME}\nКомпания клиента: {CLIENT_COMPANY}\nДолжность: {CLIENT_TITLE}"
        ),
        ConversationMode::Manager => format!(
            "Имя менеджера: {MANAGER_NAME}\nКлиент: {CLIENT_NAME}, {CLIENT_TITLE} {CLIENT_COMPANY}"
        ),
        ConversationMode::Auto => format!(
            "Менеджер: {MANAGER_NAME} (AI Caller)\nКлиент: {CLIENT_NAME}, {CLIENT_TITLE} {CLIENT_COMPANY}"
        ),
    };
    let _ = write!(prompt, "\n\n{persona}");

    let cue = match mode {
        ConversationMode::Client => {
            "Начни разговор с того, что ты поднял трубку и сказал \"Алло\" или \"Да, слушаю\"."
        }
        ConversationMode::Manager => {
            "Начни разговор с приветствия и представления, как будто клиент только что взял трубку."
        }
        ConversationMode::Auto => "Начни разговор с первого звонка менеджера.",
    };
    let _ = write!(prompt, "\n\n{cue}");

    prompt
}
